use std::net::{Ipv4Addr, UdpSocket};
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::{debug, info};

/// Failures while building or running the blocking tunnel
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("socket error: {0}")]
    Socket(#[from] std::io::Error),

    #[error("host refused to protect the tunnel socket")]
    Protect,

    #[error("invalid tunnel argument: {0}")]
    InvalidArgument(String),

    #[error("failed to establish tunnel: {0}")]
    Establish(String),

    #[error("application not installed: {0}")]
    AppNotFound(String),
}

impl TunnelError {
    /// Socket-level failures are reported separately in diagnostics
    pub fn is_socket(&self) -> bool {
        matches!(self, TunnelError::Socket(_))
    }
}

/// Fully resolved tunnel configuration handed to the provider
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelSpec {
    pub addresses: Vec<(Ipv4Addr, u8)>,
    pub routes: Vec<(Ipv4Addr, u8)>,
    /// Only these apps are routed into the tunnel, which cuts them off
    pub included_apps: Vec<String>,
}

/// Collects a [`TunnelSpec`], validating each argument as it is added
#[derive(Debug, Default)]
pub struct TunnelBuilder {
    spec: TunnelSpec,
}

impl TunnelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_address(&mut self, address: Ipv4Addr, prefix: u8) -> Result<&mut Self, TunnelError> {
        check_prefix(prefix)?;
        self.spec.addresses.push((address, prefix));
        Ok(self)
    }

    pub fn add_route(&mut self, route: Ipv4Addr, prefix: u8) -> Result<&mut Self, TunnelError> {
        check_prefix(prefix)?;
        self.spec.routes.push((route, prefix));
        Ok(self)
    }

    /// Route one app into the tunnel; fails with `AppNotFound` when the
    /// provider cannot resolve it
    pub fn add_included_app(
        &mut self,
        provider: &dyn TunnelProvider,
        package: &str,
    ) -> Result<&mut Self, TunnelError> {
        provider.resolve_app(package)?;
        self.spec.included_apps.push(package.to_string());
        Ok(self)
    }

    pub fn build(self) -> Result<TunnelSpec, TunnelError> {
        if self.spec.addresses.is_empty() {
            return Err(TunnelError::InvalidArgument("tunnel needs an address".to_string()));
        }
        Ok(self.spec)
    }
}

fn check_prefix(prefix: u8) -> Result<(), TunnelError> {
    if prefix > 32 {
        return Err(TunnelError::InvalidArgument(format!("prefix {} is out of range", prefix)));
    }
    Ok(())
}

/// An established tunnel; closing it restores network access
pub trait TunnelInterface: Send {
    fn close(&mut self) -> Result<(), TunnelError>;
}

/// Host services needed to stand up the tunnel
pub trait TunnelProvider: Send + Sync {
    /// Exempt the control socket from the tunnel so setup traffic does not
    /// loop back into it
    fn protect(&self, socket: &UdpSocket) -> bool;

    /// Check that an app is installed and can be routed
    fn resolve_app(&self, package: &str) -> Result<(), TunnelError>;

    fn establish(&self, spec: &TunnelSpec) -> Result<Box<dyn TunnelInterface>, TunnelError>;
}

/// Provider that only logs what it would configure
#[derive(Default)]
pub struct DryRunTunnelProvider {
    next_id: AtomicU64,
}

impl DryRunTunnelProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TunnelProvider for DryRunTunnelProvider {
    fn protect(&self, socket: &UdpSocket) -> bool {
        match socket.local_addr() {
            Ok(addr) => {
                debug!("[DRY RUN] Would protect tunnel socket {}", addr);
                true
            }
            Err(_) => false,
        }
    }

    fn resolve_app(&self, package: &str) -> Result<(), TunnelError> {
        if package.trim().is_empty() {
            return Err(TunnelError::AppNotFound(package.to_string()));
        }
        Ok(())
    }

    fn establish(&self, spec: &TunnelSpec) -> Result<Box<dyn TunnelInterface>, TunnelError> {
        // Without a route no traffic enters the tunnel, so nothing would be blocked
        if spec.routes.is_empty() {
            return Err(TunnelError::Establish("tunnel has no routes".to_string()));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        info!(
            "[DRY RUN] Would establish tunnel #{} with addresses {:?}, routes {:?} for {} app(s)",
            id,
            spec.addresses,
            spec.routes,
            spec.included_apps.len()
        );
        Ok(Box::new(DryRunInterface { id }))
    }
}

struct DryRunInterface {
    id: u64,
}

impl TunnelInterface for DryRunInterface {
    fn close(&mut self) -> Result<(), TunnelError> {
        info!("[DRY RUN] Would close tunnel #{}", self.id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_rejects_bad_prefix() {
        let mut builder = TunnelBuilder::new();
        let err = builder.add_address(Ipv4Addr::new(192, 168, 0, 0), 40).unwrap_err();
        assert!(matches!(err, TunnelError::InvalidArgument(_)));
        assert!(!err.is_socket());
    }

    #[test]
    fn test_builder_requires_address() {
        let mut builder = TunnelBuilder::new();
        builder.add_route(Ipv4Addr::UNSPECIFIED, 0).unwrap();
        assert!(matches!(builder.build(), Err(TunnelError::InvalidArgument(_))));
    }

    #[test]
    fn test_builder_collects_spec() {
        let provider = DryRunTunnelProvider::new();
        let mut builder = TunnelBuilder::new();
        builder
            .add_address(Ipv4Addr::new(192, 168, 0, 0), 24)
            .unwrap()
            .add_route(Ipv4Addr::UNSPECIFIED, 0)
            .unwrap();
        builder.add_included_app(&provider, "com.x").unwrap();
        assert!(matches!(
            builder.add_included_app(&provider, " "),
            Err(TunnelError::AppNotFound(_))
        ));

        let spec = builder.build().unwrap();
        assert_eq!(spec.addresses, vec![(Ipv4Addr::new(192, 168, 0, 0), 24)]);
        assert_eq!(spec.routes, vec![(Ipv4Addr::UNSPECIFIED, 0)]);
        assert_eq!(spec.included_apps, vec!["com.x".to_string()]);
    }

    #[test]
    fn test_dry_run_provider_establishes_and_closes() {
        let provider = DryRunTunnelProvider::new();
        let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        assert!(provider.protect(&socket));

        let spec = TunnelSpec {
            addresses: vec![(Ipv4Addr::new(192, 168, 0, 0), 24)],
            routes: vec![(Ipv4Addr::UNSPECIFIED, 0)],
            included_apps: vec!["com.x".to_string()],
        };
        let mut tunnel = provider.establish(&spec).unwrap();
        assert!(tunnel.close().is_ok());
    }

    #[test]
    fn test_dry_run_provider_rejects_tunnel_without_routes() {
        let provider = DryRunTunnelProvider::new();
        let spec = TunnelSpec {
            addresses: vec![(Ipv4Addr::new(192, 168, 0, 0), 24)],
            routes: Vec::new(),
            included_apps: vec!["com.x".to_string()],
        };

        let err = provider.establish(&spec).err().unwrap();
        assert!(matches!(err, TunnelError::Establish(_)));
        assert!(!err.is_socket());
    }

    #[test]
    fn test_io_error_is_socket_error() {
        let err: TunnelError = std::io::Error::other("boom").into();
        assert!(err.is_socket());
    }
}
