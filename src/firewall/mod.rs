//! Host/path allow-or-deny decisions for HTTP and proxy flows.
//!
//! A [`Firewall`] holds a rule table `path -> [host | "*"]`, a mode
//! (blacklist or whitelist), and a `subpath_enabled` flag controlling
//! whether a rule registered at `/` also applies to deeper paths.

use std::collections::HashMap;

/// A single firewall rule table: path -> set of host patterns
/// (`"*"` matches any host).
pub type RuleTable = HashMap<String, Vec<String>>;

/// Firewall operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Hosts matching a rule are denied; everything else is allowed.
    Blacklist,
    /// Only hosts matching a rule are allowed; everything else is denied.
    Whitelist,
}

/// Host/path firewall.
#[derive(Debug, Clone)]
pub struct Firewall {
    rules: RuleTable,
    mode: Mode,
    subpath_enabled: bool,
}

impl Firewall {
    /// Build a firewall from its rule table, mode, and subpath toggle.
    pub fn new(rules: RuleTable, mode: Mode, subpath_enabled: bool) -> Self {
        Self {
            rules,
            mode,
            subpath_enabled,
        }
    }

    fn host_matches(hosts: &[String], remote_host: &str) -> bool {
        hosts.iter().any(|h| h == remote_host || h == "*")
    }

    /// Evaluate the HTTP algorithm: walk the path from `path` toward `/`,
    /// shortening one component at a time, consulting the rule table at
    /// each ancestor. Returns `true` if the request should be allowed.
    pub fn allow_http(&self, remote_host: &str, path: &str) -> bool {
        for ancestor in path_ancestors(path) {
            if let Some(hosts) = self.rules.get(ancestor) {
                if Self::host_matches(hosts, remote_host) {
                    return self.mode == Mode::Whitelist;
                }
            }
        }

        // The root rule applies when the request path is itself "/", or
        // when subpath matching is disabled (the more permissive reading
        // of the two source variants; spec.md section 9 pins this).
        if path == "/" || !self.subpath_enabled {
            if let Some(hosts) = self.rules.get("/") {
                if Self::host_matches(hosts, remote_host) {
                    return self.mode == Mode::Whitelist;
                }
            }
        }

        self.mode == Mode::Blacklist
    }

    /// Evaluate the proxy algorithm: a direct lookup of `rules[host]`,
    /// with no ancestor walk.
    pub fn allow_proxy(&self, remote_host: &str, proxy_host: &str) -> bool {
        if let Some(hosts) = self.rules.get(proxy_host) {
            if Self::host_matches(hosts, remote_host) {
                return self.mode == Mode::Whitelist;
            }
        }
        self.mode == Mode::Blacklist
    }
}

/// Yield `path`, then each ancestor directory of `path` down to (but not
/// including) `/`, e.g. `/a/b/c` -> `/a/b/c`, `/a/b`, `/a`.
fn path_ancestors(path: &str) -> impl Iterator<Item = &str> {
    std::iter::successors(Some(path), |p| {
        if *p == "/" {
            None
        } else {
            let parent = match p.rfind('/') {
                Some(0) => "/",
                Some(idx) => &p[..idx],
                None => "/",
            };
            Some(parent)
        }
    })
    .take_while(|p| *p != "/")
}
