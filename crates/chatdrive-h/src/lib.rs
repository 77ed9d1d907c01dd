pub mod cdp;
pub mod inject;
pub mod view;

pub use cdp::{CdpClient, ConnectMode};
pub use view::CdpView;
