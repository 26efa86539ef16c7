pub mod dashboard;
pub mod ocpp_server;

pub use dashboard::{ws_dashboard_handler, DashboardState};
pub use ocpp_server::OcppServer;
