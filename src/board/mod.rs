//! Project board back-end.
//!
//! ## Module Map
//!
//! ```text
//! ┌──────────┐   HTTP   ┌──────────────────────────────────────────────────┐
//! │  Client  │ ───────> │  server.rs  (axum Router, ServerConfig)          │
//! │          │ <─────── │    └─ api/  (handlers per resource, AppState)    │
//! └──────────┘ WebSocket│         │                                        │
//!                       │         │ DbHandle::call()                       │
//!                       │         v                                        │
//!                       │  db/  (BoardDb over one SQLite connection)       │
//!                       │         │                                        │
//!                       │         │ AppState::publish() wakes the mirror   │
//!                       │         v                                        │
//!                       │  store.rs  (JSON directory, remote documents)    │
//!                       └──────────────────────────────────────────────────┘
//! ```
//!
//! ## Supporting Modules
//!
//! | Module      | Responsibility                                          |
//! |-------------|---------------------------------------------------------|
//! | `models`    | Shared types: `Card`, `Sprint`, `User`, view shapes     |
//! | `auth`      | bcrypt hashes, sessions, `CurrentUser`/`AdminUser`      |
//! | `analytics` | Gantt, health, workload, forecast, velocity, reports    |
//! | `notify`    | Mentions, `Mailer` trait, daily overdue digest          |
//! | `dates`     | Due-date parsing and overdue checks                     |
//! | `ws`        | `WsMessage` enum + `broadcast_message()` helper         |
//!
//! ## Typical Request Flow (move a card to "done")
//!
//! 1. `PUT /api/cards/{id}/status` → `api::cards::set_status()`
//! 2. `CurrentUser` resolves the bearer token through `BoardDb::authenticate`.
//! 3. `BoardDb::set_card_status` writes the status and stamps (or clears)
//!    `completed_at` in a single statement.
//! 4. The handler publishes `WsMessage::CardMoved`; connected clients get it
//!    over `/ws` and the mirror task exports the database after a short
//!    debounce.

pub mod analytics;
pub mod api;
pub mod auth;
pub mod dates;
pub mod db;
pub mod models;
pub mod notify;
pub mod server;
pub mod store;
pub mod ws;
