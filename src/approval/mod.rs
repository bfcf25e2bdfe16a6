// Approval Workflow

pub mod requests;
pub mod topic_access;

pub use requests::{ApprovalService, Rejection, RequestQuery};
pub use topic_access::{AccessRequestQuery, NewTopicAccessRequest};
