pub mod capture;
pub mod error;
pub mod server;

pub use capture::PacketCapture;
pub use error::{EchoError, EchoResult};
pub use server::{EchoConfig, EchoServer, STANDARD_MTU_SIZE};
