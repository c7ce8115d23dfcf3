//! mDNS service advertisement for the Embercast receiver.
//!
//! The receiver calls [`EmbercastAdvertiser::register`] once the signaling
//! listener is bound, so that any sender on the same subnet can discover it
//! without manual IP entry.
//!
//! # TXT record keys
//!
//! | Key       | Value                                     |
//! |-----------|-------------------------------------------|
//! | `version` | Protocol version (`"1"`)                  |
//! | `port`    | TCP signaling port                        |
//! | `host`    | Advertised LAN IP address                 |
//! | `status`  | Receiver status text shown to senders     |

use std::collections::HashMap;
use std::net::IpAddr;

use anyhow::Result;
use mdns_sd::{ServiceDaemon, ServiceInfo};
use tracing::{info, warn};

pub const SERVICE_TYPE: &str = "_embercast._tcp.local.";

/// Active mDNS service advertisement. Drop or call [`unregister`] to stop.
///
/// [`unregister`]: EmbercastAdvertiser::unregister
pub struct EmbercastAdvertiser {
    daemon: ServiceDaemon,
    fullname: String,
}

impl EmbercastAdvertiser {
    /// Register this receiver on the local mDNS domain.
    ///
    /// # Arguments
    /// - `instance_name` — human-readable instance name
    ///   (visible in sender discovery lists, e.g. `"Embercast Receiver"`)
    /// - `port` — TCP signaling port the receiver listens on
    /// - `host_ip` — local LAN IP address to advertise
    /// - `status_text` — receiver status line, mirrored into the TXT record
    pub fn register(
        instance_name: &str,
        port: u16,
        host_ip: IpAddr,
        status_text: &str,
    ) -> Result<Self> {
        let daemon = ServiceDaemon::new()?;

        // Build hostname — e.g. "myhost.local."
        let raw_host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "embercast-receiver".to_owned());
        let host = format!("{raw_host}.local.");

        let mut properties = HashMap::new();
        properties.insert("version".to_owned(), "1".to_owned());
        properties.insert("port".to_owned(), port.to_string());
        properties.insert("host".to_owned(), host_ip.to_string());
        properties.insert("status".to_owned(), status_text.to_owned());

        let service = ServiceInfo::new(
            SERVICE_TYPE,
            instance_name,
            &host,
            host_ip,
            port,
            Some(properties),
        )?;

        let fullname = service.get_fullname().to_owned();
        daemon.register(service)?;

        info!("[mDNS] Advertising '{instance_name}' at {host_ip}:{port}");

        Ok(Self { daemon, fullname })
    }

    /// Remove the mDNS advertisement.
    pub fn unregister(self) {
        if let Err(e) = self.daemon.unregister(&self.fullname) {
            warn!("[mDNS] Failed to unregister '{}': {}", self.fullname, e);
        } else {
            info!("[mDNS] Advertisement '{}' removed.", self.fullname);
        }
    }
}

// ── Local IP detection ────────────────────────────────────────────────────────

/// Detect the primary LAN IPv4 address by probing an external socket.
///
/// No packets are actually sent — this just queries the OS routing table.
pub fn detect_local_ip() -> IpAddr {
    std::net::UdpSocket::bind("0.0.0.0:0")
        .and_then(|s| {
            s.connect("8.8.8.8:80")?;
            s.local_addr()
        })
        .map(|a| a.ip())
        .unwrap_or_else(|_| IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)))
}
