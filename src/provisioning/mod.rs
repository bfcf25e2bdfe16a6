// Provisioning State Tracker and the virtual-cluster records it maintains

pub mod patch;
pub mod tracker;
pub mod virtual_clusters;

pub use patch::{ApplicationPatch, EnvironmentReport};
pub use tracker::{IssueFilter, ProvisioningTracker};
pub use virtual_clusters::{NewVirtualCluster, VirtualClusterPatch, VirtualClusterService};
