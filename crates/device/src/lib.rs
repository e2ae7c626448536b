mod denoise;
mod driver;
mod state;

pub use denoise::denoise_formatted_text;
pub use driver::{DeviceDriver, DeviceError, HttpDeviceDriver, PortalInfo};
pub use state::{
    classify_transition, CommandRequest, ExecutionReport, RawExecutionResult, StateChangeKind,
    UiElement, UiState,
};
