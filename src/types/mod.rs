// ABOUTME: Validated domain types shared by every layer of the orchestrator.
// ABOUTME: Colors, endpoints, service names, image references, and phantom-typed ids.

mod color;
mod endpoint;
mod id;
mod image_ref;
mod service_name;

pub use color::{Color, ListenerKind, ParseColorError};
pub use endpoint::{Endpoint, ParseEndpointError};
pub use id::{DeploymentId, Id, RequestId};
pub use image_ref::{ImageRef, ParseImageRefError};
pub use service_name::{ServiceName, ServiceNameError};
