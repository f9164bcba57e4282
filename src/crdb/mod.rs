//! CRDB response decoding
//!
//! - **Codec**: response payload to records keyed by group
//! - **RLE**: object-id runs, value runs and column cursors
//! - **Row**: positional access to aggregate rows
//!
//! # Example
//!
//! ```rust
//! use crashq::crdb::{decode_value, GroupBody};
//! use serde_json::json;
//!
//! let result = decode_value(json!({
//!     "columns": ["size"],
//!     "objects": [["*", [[16, 2]]]],
//!     "values": [["*", [[100, 3]]]]
//! }))
//! .unwrap();
//!
//! match result.get("*") {
//!     Some(GroupBody::Objects(rows)) => assert_eq!(rows.len(), 3),
//!     other => panic!("unexpected {:?}", other),
//! }
//! ```

mod codec;
mod error;
mod rle;
mod row;

pub use codec::{
    decode, decode_value, AggregateRecord, Group, GroupBody, RawResponse, Record, ResultSet,
    ServiceError, OBJECT_FIELD,
};
pub use error::{CrdbError, CrdbResult};
pub use rle::{object_runs, value_runs, ColumnCursor, ObjectRun, ValueRun};
pub use row::{unwrap_unique, Row, RowAccessor};
