pub mod analytics;
pub mod session;

pub use analytics::AnalyticsEventRow;
pub use session::SessionBlobRow;
