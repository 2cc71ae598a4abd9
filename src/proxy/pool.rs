use crate::proxy::ProxyEndpoint;

/// The set of proxies split into active and quarantined endpoints
///
/// An endpoint lives in exactly one of the two sets. The active set keeps
/// insertion order so round-robin selection is predictable; re-admitted
/// endpoints rejoin at the back.
#[derive(Debug, Clone, Default)]
pub struct ProxyPool {
    active: Vec<ProxyEndpoint>,
    quarantined: Vec<ProxyEndpoint>,
}

impl ProxyPool {
    /// Creates a pool with every endpoint active (duplicates dropped)
    pub fn new(endpoints: Vec<ProxyEndpoint>) -> Self {
        let mut active: Vec<ProxyEndpoint> = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            if !active.contains(&endpoint) {
                active.push(endpoint);
            }
        }

        Self {
            active,
            quarantined: Vec::new(),
        }
    }

    /// Picks the active endpoint for a round-robin ticket
    pub fn pick(&self, ticket: usize) -> Option<&ProxyEndpoint> {
        if self.active.is_empty() {
            return None;
        }
        self.active.get(ticket % self.active.len())
    }

    /// Moves an endpoint from quarantine back to the active set
    ///
    /// Returns false when the endpoint is not quarantined.
    pub fn readmit(&mut self, endpoint: &ProxyEndpoint) -> bool {
        match self.quarantined.iter().position(|p| p == endpoint) {
            Some(index) => {
                let proxy = self.quarantined.swap_remove(index);
                self.active.push(proxy);
                true
            }
            None => false,
        }
    }

    /// Moves an endpoint from the active set into quarantine
    ///
    /// Returns false when the endpoint is not active.
    pub fn quarantine(&mut self, endpoint: &ProxyEndpoint) -> bool {
        match self.active.iter().position(|p| p == endpoint) {
            Some(index) => {
                let proxy = self.active.remove(index);
                self.quarantined.push(proxy);
                true
            }
            None => false,
        }
    }

    pub fn active(&self) -> &[ProxyEndpoint] {
        &self.active
    }

    pub fn quarantined(&self) -> &[ProxyEndpoint] {
        &self.quarantined
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn quarantined_len(&self) -> usize {
        self.quarantined.len()
    }

    pub fn has_active(&self) -> bool {
        !self.active.is_empty()
    }
}
