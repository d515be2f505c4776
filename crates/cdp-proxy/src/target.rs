use vw_protocol::CdpConfig;

/// Resolved upstream/proxy authorities, derived once from configuration.
#[derive(Debug, Clone)]
pub struct ProxyTarget {
    pub upstream_authority: String,
    pub proxy_authority: String,
    pub upstream_base_http: String,
    pub upstream_base_ws: String,
}

impl ProxyTarget {
    pub fn resolve(cdp: &CdpConfig, server_bind: &str, server_port: u16) -> Self {
        let upstream_authority = format!("{}:{}", cdp.upstream_host, cdp.upstream_port);
        let advertised_host = cdp.advertised_host.clone().unwrap_or_else(|| server_bind.to_string());
        let advertised_port = cdp.advertised_port.unwrap_or(server_port);
        let proxy_authority = format!("{advertised_host}:{advertised_port}");
        Self {
            upstream_base_http: format!("http://{upstream_authority}"),
            upstream_base_ws: format!("ws://{upstream_authority}"),
            upstream_authority,
            proxy_authority,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_from_defaults() {
        let cdp = CdpConfig::default();
        let target = ProxyTarget::resolve(&cdp, "0.0.0.0", 8080);
        assert_eq!(target.upstream_authority, "127.0.0.1:9223");
        assert_eq!(target.proxy_authority, "0.0.0.0:8080");
        assert_eq!(target.upstream_base_ws, "ws://127.0.0.1:9223");
    }

    #[test]
    fn advertised_overrides_take_precedence() {
        let mut cdp = CdpConfig::default();
        cdp.advertised_host = Some("proxy.example.com".to_string());
        cdp.advertised_port = Some(443);
        let target = ProxyTarget::resolve(&cdp, "0.0.0.0", 8080);
        assert_eq!(target.proxy_authority, "proxy.example.com:443");
    }
}
