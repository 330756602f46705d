//! HTTP handler resource: the transport and fetch client of one source.

use std::sync::Arc;

use crate::config::HttpSettings;
use crate::resource::Resource;

use super::{DataClient, HttpTransport};

/// Per-source HTTP plumbing, resolved through the provider pipeline so that
/// hosts can substitute their own transport.
#[derive(Debug)]
pub struct HttpHandlerResource {
    transport: Arc<dyn HttpTransport>,
    client: Arc<DataClient>,
}

impl HttpHandlerResource {
    pub fn new(transport: Arc<dyn HttpTransport>, settings: HttpSettings) -> Self {
        let client = Arc::new(DataClient::new(Arc::clone(&transport), settings));
        Self { transport, client }
    }

    pub fn transport(&self) -> &Arc<dyn HttpTransport> {
        &self.transport
    }

    /// Fetch client shared by every resource of the source.
    pub fn client(&self) -> &Arc<DataClient> {
        &self.client
    }
}

impl Resource for HttpHandlerResource {}
