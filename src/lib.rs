mod app;
mod cli;
pub mod dsi;
mod error;
pub mod media;
pub mod panel;
mod telemetry;
mod terminal;
pub mod transport;
mod utils;

pub use app::{
    capture_transport, fake_transport, open_transport, run, run_with_clients, run_with_log_level,
};
pub use cli::{
    Args, Command, DsiFrameArgs, DsiInitArgs, FakeArgs, FrameSource, GeometryArgs, LogLevel,
    OutputFormat, PanelFrameArgs, PanelStreamArgs, PollArgs, TransportArgs,
};
pub use error::{DriveError, LinkError, ProtocolError, TimeoutError};
pub use media::{PanelDimensions, PixelBuffer, PixelBufferError, PixelFormat};
pub use terminal::{SystemTerminalClient, TerminalClient};
