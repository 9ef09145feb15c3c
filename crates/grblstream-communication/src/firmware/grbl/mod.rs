//! GRBL streaming protocol
//!
//! Line parsing, message taxonomy, device state, observer dispatch, flow
//! control and the channel pump that ties them together.

pub mod controller;
pub mod dispatcher;
pub mod error_decoder;
pub mod flow_control;
pub mod messages;
pub mod realtime;
pub mod response_parser;
pub mod state;

pub use controller::{GrblLink, LinkConfig};
pub use dispatcher::{MessageDispatcher, Observer, ObserverHandle};
pub use error_decoder::{describe_alarm, describe_error};
pub use flow_control::{
    AcknowledgeGated, ByteBudgeted, FlowControl, FlowStrategy, PlannerUsage,
    DEFAULT_PLANNER_CAPACITY,
};
pub use messages::{Message, Response, StatusFields, StatusScalar, StatusValue, MODE_KEY};
pub use realtime::RealtimeCommand;
pub use response_parser::{decode_line, parse_line};
pub use state::{DeviceState, StateTracker};
