//! # bigtwo-service: Big Two table service
//!
//! Async layer around [`bigtwo_engine`]: a registry of live tables (one per chat
//! channel), a per-table lock that serializes every play and pass, stake escrow against
//! an external [`Ledger`], event fan-out and game history.
//!
//! ```rust
//! use std::sync::Arc;
//! use bigtwo_service::{AccountScope, InMemoryLedger, ServiceConfig, TableManager};
//!
//! # let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
//! # rt.block_on(async {
//! let ledger = Arc::new(InMemoryLedger::new());
//! let manager = TableManager::new(ServiceConfig::default(), ledger);
//!
//! let table = manager.create_table(42, AccountScope::Global, 1, None).unwrap();
//! manager.join(&table, 2).await.unwrap();
//! let view = manager.start(&table, 1).await.unwrap();
//! assert!(view.current_player.is_some());
//! # });
//! ```

pub mod config;
pub mod errors;
pub mod escrow;
pub mod events;
pub mod history;
pub mod ledger;
pub mod logging;
pub mod session;

pub use config::{ConfigError, ConfigResolved, ConfigSources, ServiceConfig, ValueSource};
pub use errors::{ErrorResponse, ErrorSeverity, IntoErrorResponse, TableError};
pub use escrow::{Escrow, Payout, Pot, Refund};
pub use events::{EventBus, EventSubscription, TableEvent};
pub use history::{GameHistory, HistoryError, PlayerStats};
pub use ledger::{AccountScope, InMemoryLedger, Ledger, LedgerError};
pub use logging::{init_logging, LogEntry, LogFormat, TestLogSubscriber};
pub use session::{ChannelId, SeatView, TableId, TableManager, TableSession, TableView};
