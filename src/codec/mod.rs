//! Codec module - binary encoding of requests and responses.
//!
//! - [`geometry`] - one mesh snapshot per block, with sequential loop indices
//! - [`request`] - version, options and objects, length-prefixed as one frame
//! - [`response`] - progress, error and success frame bodies
//!
//! Both directions are implemented so the engine side (and tests) can decode
//! what the host encodes and vice versa.
//!
//! # Example
//!
//! ```
//! use uvpack_bridge::codec::{Request, ResponseFrame};
//! use uvpack_bridge::mesh::{EditableMesh, HostMesh};
//! use uvpack_bridge::options::PackOptions;
//!
//! let tri = EditableMesh::new(
//!     "Tri",
//!     1,
//!     vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]],
//!     vec![vec![0, 1, 2]],
//! );
//! let request = Request::new(PackOptions::default(), vec![tri.snapshot()]);
//! let encoded = request.encode().unwrap();
//! assert_eq!(encoded.layouts[0].loop_count(), 3);
//!
//! let body = ResponseFrame::Progress(0.5).encode();
//! assert_eq!(ResponseFrame::decode(&body).unwrap(), ResponseFrame::Progress(0.5));
//! ```

pub mod geometry;
mod request;
mod response;

pub use geometry::{decode_geometry, encode_geometry, DecodedGeometry};
pub use request::{EncodedRequest, Request, NO_OBJECTS_MESSAGE};
pub use response::{ObjectResult, ResponseFrame, ResultSet};
