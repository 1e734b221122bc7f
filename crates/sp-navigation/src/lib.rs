//! Navigation policy gate: decides whether the rendering engine may follow
//! a navigation, and keeps an audit trail of every decision.

pub mod audit;
pub mod config;
pub mod fs;
pub mod gate;

pub use audit::AuditLog;
pub use audit::NavigationAuditEntry;
pub use audit::NavigationStats;
pub use config::GateConfig;
pub use fs::FileSystem;
pub use fs::StdFileSystem;
pub use gate::NavigationDecision;
pub use gate::NavigationGate;
pub use gate::NavigationOutcome;
pub use gate::NavigationRequest;
pub use sp_core::NavigationTrigger;
pub use sp_markdown as markdown;
pub use sp_markdown::MarkdownDocument;
pub use sp_url::NavUrl;
