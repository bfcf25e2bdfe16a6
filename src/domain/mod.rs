pub mod access;
pub mod application;
pub mod lineage;
pub mod request;
pub mod usage;
pub mod workspace;

pub use access::AccessScope;
pub use application::{
    validate_slug, Application, ApplicationStatus, Environment, EnvironmentDetail,
    EnvironmentOutcome, ProvisioningDetails, ProvisioningStatus, VirtualCluster,
    VirtualClusterStatus,
};
pub use lineage::{
    ApplicationLineage, CrossWorkspaceDirection, Direction, EdgeKey, EdgePatch, EdgeUpsert,
    EdgeView, LineageEdge, LineageSnapshot, LineageSubject, LineageSummary, Observation,
    SnapshotParticipant, TopicLineage, ACTIVE_WINDOW_HOURS,
};
pub use request::{
    AccessLevel, ApplicationRequest, AutoApprovePolicy, RequestStatus, TopicAccessRequest,
};
pub use usage::{ChargebackLineItem, ChargebackRates, ChargebackReport, ChargebackSummary, UsageMetric};
pub use workspace::{Topic, Workspace};
