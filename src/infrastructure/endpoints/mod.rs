pub mod http;

use crate::domain::models::ActionEndpointBox;

pub struct EndpointManager {}

impl EndpointManager {
    pub fn get() -> ActionEndpointBox {
        return Box::<http::HttpActionEndpoint>::default();
    }
}
