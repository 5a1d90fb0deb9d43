//! Automation trigger: text commands, the target surface and named click targets

pub mod command;
pub mod dispatcher;
pub mod surface;
pub mod targets;

pub use command::{Command, CommandError};
pub use dispatcher::{CommandResult, Dispatcher, ScreenshotPayload};
pub use surface::{Frame, HeadlessSurface, Surface, MARKER_COLOR};
pub use targets::{ClickTarget, ClickTargets};
