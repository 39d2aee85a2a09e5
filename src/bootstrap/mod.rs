mod server;
mod shutdown;
mod state;

pub use server::{Hub, Server};
pub use shutdown::{ShutdownManager, ShutdownState};
pub use state::{HubState, SharedHubState, TenantRegistry};
