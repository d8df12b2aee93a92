pub mod external;
pub mod local;
pub mod registry;

pub use external::{ExternalTool, STAGE_AND_TEST};
pub use local::{DESIGN_UI, DEVELOP_LOGIC, LocalTool};
pub use registry::{InvokeRequest, InvokeResponse, ToolHandler, ToolRegistry};
