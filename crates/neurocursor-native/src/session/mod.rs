//! Session orchestration and shared state
//!
//! - [`shared`]: Latest-sample slot, baseline store, interlock, centre requests, cancellation
//! - [`control`]: Per-tick pipeline and the blocking control loop

pub mod control;
pub mod shared;

pub use control::{
    run_control_loop, ActionSink, ControlSession, Controller, SessionHandles, TickOutcome,
    TickStatus,
};
pub use shared::{
    BaselineStore, CancelToken, CentreRequest, CentreTarget, Interlock, PauseReason, SampleSlot,
    SampleSnapshot,
};
