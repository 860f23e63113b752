//! Host provisioning over a command-execution and file-transfer transport.
//!
//! [`RemoteHost`] wraps one authenticated session to a machine and
//! [`Deployer`] runs the provisioning protocol on top of it: dependency
//! checks, a private working directory, payload upload, a generated
//! controller script, and the start/stop/cleanup lifecycle of the worker
//! daemon.

mod controller;
mod deployer;
mod digest;
pub mod error;
mod host;
mod session;
pub mod testing;
pub mod transport;

pub use controller::{controller_name, controller_script};
pub use deployer::{DeployOptions, Deployer};
pub use digest::{local_digest, remote_digest_command};
pub use host::{current_user, parse_hosts, parse_hosts_with_user, HostDescriptor, ProvisionedHost};
pub use session::{HandshakeLock, RemoteHost};
