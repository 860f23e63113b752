use std::fmt;

use crate::error::{DeployError, DeployResult};

/// A host to deploy a worker to, parsed from `{user{:secret}@}machine{:port}`.
///
/// The port is the port the worker listens on. The remote shell is reached
/// through the transport's own port.
#[derive(Clone, PartialEq, Eq)]
pub struct HostDescriptor {
    user: String,
    secret: Option<String>,
    machine: String,
    port: u16,
}

impl HostDescriptor {
    pub fn new(user: impl Into<String>, machine: impl Into<String>, port: u16) -> Self {
        Self {
            user: user.into(),
            secret: None,
            machine: machine.into(),
            port,
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    /// The password for the host, or `None` to use local key-based credentials.
    pub fn secret(&self) -> Option<&str> {
        self.secret.as_deref()
    }

    pub fn machine(&self) -> &str {
        &self.machine
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// The `user@machine` destination for the remote shell.
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.machine)
    }
}

impl fmt::Display for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.machine, self.port)
    }
}

impl fmt::Debug for HostDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostDescriptor")
            .field("user", &self.user)
            .field("secret", &self.secret.as_ref().map(|_| "***"))
            .field("machine", &self.machine)
            .field("port", &self.port)
            .finish()
    }
}

struct HostParts<'a> {
    user: Option<&'a str>,
    secret: Option<&'a str>,
    machine: &'a str,
    port: Option<u16>,
}

fn parse_parts(value: &str) -> DeployResult<HostParts<'_>> {
    let invalid = |reason: &str| DeployError::configuration(format!("invalid host {value:?}: {reason}"));
    let value = value.trim();
    if value.is_empty() {
        return Err(invalid("empty host"));
    }
    if value.chars().any(char::is_whitespace) {
        return Err(invalid("whitespace is not allowed"));
    }
    let (credentials, address) = match value.rsplit_once('@') {
        Some((credentials, address)) => (Some(credentials), address),
        None => (None, value),
    };
    let (user, secret) = match credentials {
        None => (None, None),
        Some(credentials) => match credentials.split_once(':') {
            Some((user, secret)) => (Some(user), Some(secret)),
            None => (Some(credentials), None),
        },
    };
    if user.is_some_and(str::is_empty) {
        return Err(invalid("empty user"));
    }
    if secret.is_some_and(str::is_empty) {
        return Err(invalid("empty secret"));
    }
    let (machine, port) = match address.rsplit_once(':') {
        Some((machine, port)) => {
            let port = port.parse::<u16>().map_err(|_| invalid("bad port"))?;
            (machine, Some(port))
        }
        None => (address, None),
    };
    if machine.is_empty() {
        return Err(invalid("empty machine"));
    }
    Ok(HostParts {
        user,
        secret,
        machine,
        port,
    })
}

/// Returns the name of the user running this process.
pub fn current_user() -> DeployResult<String> {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .map_err(|_| DeployError::configuration("cannot determine the current user"))
}

/// Parses host descriptors in declaration order.
/// Hosts without an explicit port get `base_port`, `base_port + 1`, and so on.
/// Hosts without a user get the user running this process.
pub fn parse_hosts(hosts: &[String], base_port: u16) -> DeployResult<Vec<HostDescriptor>> {
    parse_all(hosts, base_port, current_user)
}

pub fn parse_hosts_with_user(
    hosts: &[String],
    base_port: u16,
    default_user: &str,
) -> DeployResult<Vec<HostDescriptor>> {
    parse_all(hosts, base_port, || Ok(default_user.to_string()))
}

fn parse_all(
    hosts: &[String],
    base_port: u16,
    default_user: impl Fn() -> DeployResult<String>,
) -> DeployResult<Vec<HostDescriptor>> {
    let mut next_port = base_port;
    hosts
        .iter()
        .map(|host| {
            let parts = parse_parts(host)?;
            let port = match parts.port {
                Some(port) => port,
                None => {
                    let port = next_port;
                    next_port = next_port.checked_add(1).ok_or_else(|| {
                        DeployError::configuration("ran out of ports to assign to hosts")
                    })?;
                    port
                }
            };
            let user = match parts.user {
                Some(user) => user.to_string(),
                None => default_user()?,
            };
            Ok(HostDescriptor {
                user,
                secret: parts.secret.map(|x| x.to_string()),
                machine: parts.machine.to_string(),
                port,
            })
        })
        .collect()
}

/// A host together with the state created on it during provisioning.
#[derive(Debug, Clone)]
pub struct ProvisionedHost {
    pub descriptor: HostDescriptor,
    /// The remote working directory, e.g. `~/.drover/{uuid}`.
    pub working_directory: Option<String>,
    /// The file name of the controller script inside the working directory.
    pub controller: Option<String>,
}

impl ProvisionedHost {
    pub fn new(descriptor: HostDescriptor) -> Self {
        Self {
            descriptor,
            working_directory: None,
            controller: None,
        }
    }
}
