pub mod traits;
pub mod ws;

pub use traits::{TransportConnector, TransportStream};
pub use ws::WsConnector;
