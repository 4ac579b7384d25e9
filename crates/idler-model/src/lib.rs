mod domain;
pub use domain::{
    InstanceId, InstanceState, InstanceTarget, OperationId, RunnerRequest, SkipReason,
    StartOutcome, StopOutcome, Zone,
};

mod error;
pub use error::{ModelError, RoutingError};

mod event;
pub use event::{JobAction, JobEvent, Repository, WorkflowJob};

mod routing;
pub use routing::{RoutingEntry, RoutingTable};
