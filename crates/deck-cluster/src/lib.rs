//! Control plane seam for deck, and everything that talks to it.
//!
//! [`ControlPlane`] is the interface the sequencer applies entities through.
//! [`LocalCluster`] implements it over the ledger, enforcing naming,
//! reference and binding rules. Around it sit the image builders, env
//! resolution, host/path routing, post-deployment verification and
//! manifest rendering.

pub mod builder;
pub mod env;
pub mod error;
pub mod local;
pub mod plane;
pub mod render;
pub mod routes;
pub mod verify;

pub use builder::{ContextBuilder, DockerBuilder, ImageBuilder};
pub use env::resolve_env;
pub use error::{ClusterError, ClusterResult};
pub use local::{LocalCluster, resource_digest};
pub use plane::{ControlPlane, ExecOutput};
pub use routes::{RouteTable, RouteTarget};
pub use verify::{VerificationError, verify};
