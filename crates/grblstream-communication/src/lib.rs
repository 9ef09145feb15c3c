//! # grblstream Communication
//!
//! Byte channels and the GRBL streaming protocol.
//! Supports serial ports through `serialport` and an in-memory
//! [`MockChannel`] for tests. The [`GrblLink`] handle queues commands,
//! paces them through a flow controller and reports classified controller
//! messages to observers.

pub mod communication;
pub mod firmware;

pub use communication::{
    buffered::{Command, CommandQueue},
    mock::MockChannel,
    serial::{list_ports, SerialChannel, SerialPortInfo},
    ByteChannel, ConnectionParams, SerialParity,
};

pub use firmware::grbl::{
    describe_alarm, describe_error, decode_line, parse_line, AcknowledgeGated, ByteBudgeted,
    DeviceState, FlowControl, FlowStrategy, GrblLink, LinkConfig, Message, MessageDispatcher,
    ObserverHandle, PlannerUsage, RealtimeCommand, Response, StateTracker, StatusFields,
    StatusScalar, StatusValue, DEFAULT_PLANNER_CAPACITY, MODE_KEY,
};
