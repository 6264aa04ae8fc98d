// Postgres and SMTP implementations of the engine's collaborators

pub mod applications;
pub mod audit;
pub mod email;
pub mod users;
pub mod workflow_store;

pub use applications::PgApplicationRepository;
pub use audit::PgAuditRepository;
pub use email::EmailService;
pub use users::PgUserDirectory;
pub use workflow_store::PgWorkflowRepository;
