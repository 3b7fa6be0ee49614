//! SIP Endpoint Builder.

use std::net::SocketAddr;

use itertools::Itertools;

use crate::dialog::DialogLayer;
use crate::endpoint::{Endpoint, ImsProfile, Inner};
use crate::headers::{Header, Headers};
use crate::transaction::TransactionLayer;
use crate::transport::udp::UdpStartup;
use crate::transport::{TransportLayer, TransportStartup};
use crate::SipService;

/// Builder for creating a new SIP `Endpoint`.
pub struct Builder {
    name: String,
    transport: TransportLayer,
    transaction: Option<TransactionLayer>,
    capabilities: Headers,
    services: Vec<Box<dyn SipService>>,
    transport_start: Vec<Box<dyn TransportStartup>>,
    profile: ImsProfile,
}

impl Builder {
    /// Creates a new default instance of `Builder` to construct an
    /// `Endpoint`.
    pub fn new() -> Self {
        Builder {
            transport: TransportLayer::new(),
            name: String::new(),
            capabilities: Headers::new(),
            services: vec![],
            transaction: None,
            transport_start: vec![],
            profile: ImsProfile::default(),
        }
    }

    /// Sets the endpoint name.
    pub fn with_name<T: AsRef<str>>(mut self, s: T) -> Self {
        self.name = s.as_ref().to_string();

        self
    }

    /// Sets the IMS identity profile.
    pub fn with_profile(mut self, profile: ImsProfile) -> Self {
        self.profile = profile;

        self
    }

    /// Add a new capability to the endpoint.
    pub fn add_capability(mut self, capability: Header) -> Self {
        self.capabilities.push(capability);

        self
    }

    /// Add a UDP transport on the specified address.
    pub fn with_udp(mut self, addr: SocketAddr) -> Self {
        self.transport_start.push(Box::new(UdpStartup::new(addr)));
        self
    }

    /// Adds a service to the endpoint.
    ///
    /// This function can be called multiple times to add additional
    /// services. If a service with the same name already exists, the
    /// new service will not be added.
    pub fn with_service(mut self, service: impl SipService) -> Self {
        if self.service_exists(service.name()) {
            return self;
        }
        self.services.push(Box::new(service));

        self
    }

    /// Add a collection of services to the endpoint.
    ///
    /// Similar to [`Builder::with_service`], but expects the services
    /// as trait objects (`Box<dyn SipService>`).
    pub fn with_services<I>(mut self, services: I) -> Self
    where
        I: IntoIterator<Item = Box<dyn SipService>>,
    {
        for service in services {
            if self.service_exists(service.name()) {
                continue;
            }
            self.services.push(service);
        }

        self
    }

    fn service_exists(&self, name: &str) -> bool {
        let exists = self.services.iter().any(|s| s.name() == name);
        if exists {
            log::warn!("Service with name '{}' already exists", name);
        }
        exists
    }

    /// Sets the transaction layer.
    pub fn with_transaction_layer(mut self, tsx_layer: TransactionLayer) -> Self {
        self.transaction = Some(tsx_layer);

        self
    }

    /// Finalize the builder into an `Endpoint`.
    pub async fn build(self) -> Endpoint {
        log::trace!("Creating endpoint...");
        log::debug!(
            "Services registered {}",
            format_args!("({})", self.services.iter().map(|s| s.name()).join(", "))
        );

        let endpoint = Endpoint::from_inner(Inner {
            transaction: self.transaction,
            transport: self.transport,
            dialog: DialogLayer::default(),
            name: self.name,
            capabilities: self.capabilities,
            services: self.services.into_boxed_slice(),
            profile: self.profile,
        });

        let tx = endpoint.transport().sender();

        for tp_start in self.transport_start {
            if let Err(err) = tp_start.start(tx.clone()).await {
                log::warn!("Failed to start transport: {}", err);
            }
        }

        endpoint
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}
