//! PipeWire Thread Communication
//!
//! Command and response types exchanged between the control context and
//! the PipeWire event loop thread.

/// Commands sent to the PipeWire thread
///
/// Each command that expects a response includes a `response_id` for correlation.
#[derive(Debug)]
pub enum PwCommand {
    /// Link every output port of one node to the matching input port of another
    LinkNodes {
        output_node: u32,
        input_node: u32,
        /// Target the input node's `probe_*` ports
        probe: bool,
        response_id: u64,
    },

    /// Destroy links we created
    DestroyLinks { links: Vec<u32>, response_id: u64 },

    /// Shutdown the PipeWire thread gracefully
    Shutdown,
}

/// Responses from the PipeWire thread
#[derive(Debug)]
pub enum PwResponse {
    /// Links were created; handles in channel order
    LinksCreated { response_id: u64, links: Vec<u32> },

    /// Generic success response (for destroy operations)
    Ok { response_id: u64 },

    /// Operation failed with an error message
    Error { response_id: u64, message: String },
}

impl PwResponse {
    /// Get the response ID for correlation
    pub fn response_id(&self) -> u64 {
        match self {
            PwResponse::LinksCreated { response_id, .. } => *response_id,
            PwResponse::Ok { response_id } => *response_id,
            PwResponse::Error { response_id, .. } => *response_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_id_extraction() {
        let response = PwResponse::LinksCreated {
            response_id: 42,
            links: vec![1, 2],
        };
        assert_eq!(response.response_id(), 42);

        let error = PwResponse::Error {
            response_id: 99,
            message: "test error".to_string(),
        };
        assert_eq!(error.response_id(), 99);
    }
}
