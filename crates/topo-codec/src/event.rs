//! Canonical encoding of the event envelope (spec.md §3.3, §4.1).
//!
//! Events are a tagged union over eight payload variants (spec.md §3.3,
//! §9): the wire tag byte IS the discriminator, so there is no separate
//! `eventType` string on the wire — [`EventBody::kind`] derives it back for
//! callers that want the stable short name.

use bytes::{Buf, BufMut, BytesMut};
use topo_types::{BoundaryId, CanonicalTick, EventId, Hash32, JunctionId, PlateId, Sequence, StreamIdentity, ZERO_HASH};

use crate::domain::{expect_arity, read_stream_identity, write_stream_identity, BoundaryType, GeometryPoint};
use crate::primitives::{
    read_array_header, read_f64_blob, read_guid, read_ivarint, read_presence, write_array_header,
    write_f64_blob, write_guid, write_ivarint, write_presence,
};
use crate::CodecError;

/// One of the eight concrete topology event payloads (spec.md §3.3).
#[derive(Debug, Clone, PartialEq)]
pub enum EventBody {
    /// A new plate came into existence.
    PlateCreated {
        /// The plate's identifier.
        plate_id: PlateId,
    },
    /// A plate was retired.
    PlateRetired {
        /// The plate's identifier.
        plate_id: PlateId,
    },
    /// A new boundary came into existence between two plates.
    BoundaryCreated {
        /// The boundary's identifier.
        boundary_id: BoundaryId,
        /// Plate on the left.
        plate_id_left: PlateId,
        /// Plate on the right.
        plate_id_right: PlateId,
        /// Initial classification.
        boundary_type: BoundaryType,
        /// Initial geometry.
        geometry: Vec<f64>,
    },
    /// A boundary's classification changed.
    BoundaryTypeChanged {
        /// The boundary's identifier.
        boundary_id: BoundaryId,
        /// New classification.
        boundary_type: BoundaryType,
    },
    /// A boundary's geometry was replaced.
    BoundaryGeometryUpdated {
        /// The boundary's identifier.
        boundary_id: BoundaryId,
        /// New geometry.
        geometry: Vec<f64>,
    },
    /// A boundary was retired.
    BoundaryRetired {
        /// The boundary's identifier.
        boundary_id: BoundaryId,
    },
    /// A new junction came into existence.
    JunctionCreated {
        /// The junction's identifier.
        junction_id: JunctionId,
        /// Boundaries incident to the junction.
        boundary_ids: Vec<BoundaryId>,
        /// Initial location.
        location: GeometryPoint,
    },
    /// A junction's incident-boundary list and/or location changed.
    JunctionUpdated {
        /// The junction's identifier.
        junction_id: JunctionId,
        /// Replacement boundary list.
        boundary_ids: Vec<BoundaryId>,
        /// Replacement location, if any (spec.md §9: optional, tagged
        /// explicitly rather than via a sentinel such as NaN).
        new_location: Option<GeometryPoint>,
    },
    /// A junction was retired.
    JunctionRetired {
        /// The junction's identifier.
        junction_id: JunctionId,
    },
}

impl EventBody {
    fn tag(&self) -> u8 {
        match self {
            EventBody::PlateCreated { .. } => 0,
            EventBody::PlateRetired { .. } => 1,
            EventBody::BoundaryCreated { .. } => 2,
            EventBody::BoundaryTypeChanged { .. } => 3,
            EventBody::BoundaryGeometryUpdated { .. } => 4,
            EventBody::BoundaryRetired { .. } => 5,
            EventBody::JunctionCreated { .. } => 6,
            EventBody::JunctionUpdated { .. } => 7,
            EventBody::JunctionRetired { .. } => 8,
        }
    }

    /// The stable short string discriminator, derived from the wire tag
    /// rather than stored alongside it.
    pub fn kind(&self) -> &'static str {
        match self {
            EventBody::PlateCreated { .. } => "PlateCreated",
            EventBody::PlateRetired { .. } => "PlateRetired",
            EventBody::BoundaryCreated { .. } => "BoundaryCreated",
            EventBody::BoundaryTypeChanged { .. } => "BoundaryTypeChanged",
            EventBody::BoundaryGeometryUpdated { .. } => "BoundaryGeometryUpdated",
            EventBody::BoundaryRetired { .. } => "BoundaryRetired",
            EventBody::JunctionCreated { .. } => "JunctionCreated",
            EventBody::JunctionUpdated { .. } => "JunctionUpdated",
            EventBody::JunctionRetired { .. } => "JunctionRetired",
        }
    }

    fn write(&self, buf: &mut BytesMut) {
        match self {
            EventBody::PlateCreated { plate_id } => {
                write_array_header(buf, 1);
                write_guid(buf, plate_id);
            }
            EventBody::PlateRetired { plate_id } => {
                write_array_header(buf, 1);
                write_guid(buf, plate_id);
            }
            EventBody::BoundaryCreated {
                boundary_id,
                plate_id_left,
                plate_id_right,
                boundary_type,
                geometry,
            } => {
                write_array_header(buf, 5);
                write_guid(buf, boundary_id);
                write_guid(buf, plate_id_left);
                write_guid(buf, plate_id_right);
                buf.put_u8(boundary_type.tag());
                write_f64_blob(buf, geometry);
            }
            EventBody::BoundaryTypeChanged { boundary_id, boundary_type } => {
                write_array_header(buf, 2);
                write_guid(buf, boundary_id);
                buf.put_u8(boundary_type.tag());
            }
            EventBody::BoundaryGeometryUpdated { boundary_id, geometry } => {
                write_array_header(buf, 2);
                write_guid(buf, boundary_id);
                write_f64_blob(buf, geometry);
            }
            EventBody::BoundaryRetired { boundary_id } => {
                write_array_header(buf, 1);
                write_guid(buf, boundary_id);
            }
            EventBody::JunctionCreated { junction_id, boundary_ids, location } => {
                write_array_header(buf, 3);
                write_guid(buf, junction_id);
                write_array_header(buf, boundary_ids.len() as u32);
                for b in boundary_ids {
                    write_guid(buf, b);
                }
                write_f64_blob(buf, &[location.x, location.y, location.z]);
            }
            EventBody::JunctionUpdated { junction_id, boundary_ids, new_location } => {
                write_array_header(buf, 3);
                write_guid(buf, junction_id);
                write_array_header(buf, boundary_ids.len() as u32);
                for b in boundary_ids {
                    write_guid(buf, b);
                }
                write_presence(buf, new_location.is_some());
                if let Some(loc) = new_location {
                    write_f64_blob(buf, &[loc.x, loc.y, loc.z]);
                }
            }
            EventBody::JunctionRetired { junction_id } => {
                write_array_header(buf, 1);
                write_guid(buf, junction_id);
            }
        }
    }

    fn read(tag: u8, buf: &mut impl Buf) -> Result<Self, CodecError> {
        Ok(match tag {
            0 => {
                expect_arity(buf, 1)?;
                EventBody::PlateCreated { plate_id: read_guid(buf)? }
            }
            1 => {
                expect_arity(buf, 1)?;
                EventBody::PlateRetired { plate_id: read_guid(buf)? }
            }
            2 => {
                expect_arity(buf, 5)?;
                let boundary_id = read_guid(buf)?;
                let plate_id_left = read_guid(buf)?;
                let plate_id_right = read_guid(buf)?;
                let boundary_type = read_boundary_type(buf)?;
                let geometry = read_f64_blob(buf)?;
                EventBody::BoundaryCreated {
                    boundary_id,
                    plate_id_left,
                    plate_id_right,
                    boundary_type,
                    geometry,
                }
            }
            3 => {
                expect_arity(buf, 2)?;
                let boundary_id = read_guid(buf)?;
                let boundary_type = read_boundary_type(buf)?;
                EventBody::BoundaryTypeChanged { boundary_id, boundary_type }
            }
            4 => {
                expect_arity(buf, 2)?;
                let boundary_id = read_guid(buf)?;
                let geometry = read_f64_blob(buf)?;
                EventBody::BoundaryGeometryUpdated { boundary_id, geometry }
            }
            5 => {
                expect_arity(buf, 1)?;
                EventBody::BoundaryRetired { boundary_id: read_guid(buf)? }
            }
            6 => {
                expect_arity(buf, 3)?;
                let junction_id = read_guid(buf)?;
                let boundary_ids = read_guid_array(buf)?;
                let location = read_point(buf)?;
                EventBody::JunctionCreated { junction_id, boundary_ids, location }
            }
            7 => {
                expect_arity(buf, 3)?;
                let junction_id = read_guid(buf)?;
                let boundary_ids = read_guid_array(buf)?;
                let new_location = if read_presence(buf)? { Some(read_point(buf)?) } else { None };
                EventBody::JunctionUpdated { junction_id, boundary_ids, new_location }
            }
            8 => {
                expect_arity(buf, 1)?;
                EventBody::JunctionRetired { junction_id: read_guid(buf)? }
            }
            other => return Err(CodecError::UnknownDiscriminant { what: "EventBody", tag: other }),
        })
    }
}

fn read_boundary_type(buf: &mut impl Buf) -> Result<BoundaryType, CodecError> {
    if !buf.has_remaining() {
        return Err(CodecError::Truncated);
    }
    BoundaryType::from_tag(buf.get_u8())
}

fn read_guid_array(buf: &mut impl Buf) -> Result<Vec<BoundaryId>, CodecError> {
    let count = read_array_header(buf)?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        out.push(read_guid(buf)?);
    }
    Ok(out)
}

fn read_point(buf: &mut impl Buf) -> Result<GeometryPoint, CodecError> {
    let values = read_f64_blob(buf)?;
    if values.len() != 3 {
        return Err(CodecError::InvalidGeometryArity { expected: 3, actual: values.len() });
    }
    Ok(GeometryPoint { x: values[0], y: values[1], z: values[2] })
}

/// The full event envelope (spec.md §3.3), minus the `hash` field: hash is
/// computed and stored by the event store, never carried inside the
/// canonically-encoded event bytes themselves (spec.md §4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    /// Time-sortable event identifier.
    pub event_id: EventId,
    /// Canonical tick.
    pub tick: CanonicalTick,
    /// Strictly-increasing per-stream sequence.
    pub sequence: Sequence,
    /// The stream this event belongs to.
    pub stream: StreamIdentity,
    /// Hash of the previous event in the chain (zeros for genesis).
    pub previous_hash: Hash32,
    /// The event's own hash. Populated by the store after computing it;
    /// [`decode_event`] always returns [`topo_types::ZERO_HASH`] here since
    /// it is not part of the encoded bytes.
    pub hash: Hash32,
    /// The type-specific payload.
    pub payload: EventBody,
}

/// Canonically encodes an event envelope's `eventBytes` (spec.md §4.1).
/// The `hash` field is intentionally not part of this encoding.
pub fn encode_event(envelope: &EventEnvelope) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_array_header(&mut buf, 7);
    write_guid(&mut buf, &envelope.event_id);
    buf.put_u8(envelope.payload.tag());
    write_ivarint(&mut buf, envelope.tick);
    write_ivarint(&mut buf, envelope.sequence);
    write_stream_identity(&mut buf, &envelope.stream);
    buf.put_slice(&envelope.previous_hash);
    envelope.payload.write(&mut buf);
    buf.to_vec()
}

/// Decodes `eventBytes` written by [`encode_event`]. Unknown payload tags
/// fail with [`CodecError::UnknownDiscriminant`] — they are never silently
/// skipped (spec.md §9).
pub fn decode_event(bytes: &[u8]) -> Result<EventEnvelope, CodecError> {
    let mut cursor = bytes;
    expect_arity(&mut cursor, 7)?;
    let event_id = read_guid(&mut cursor)?;
    if !cursor.has_remaining() {
        return Err(CodecError::Truncated);
    }
    let tag = cursor.get_u8();
    let tick = read_ivarint(&mut cursor)?;
    let sequence = read_ivarint(&mut cursor)?;
    let stream = read_stream_identity(&mut cursor)?;
    if cursor.remaining() < 32 {
        return Err(CodecError::Truncated);
    }
    let mut previous_hash = [0u8; 32];
    cursor.copy_to_slice(&mut previous_hash);
    let payload = EventBody::read(tag, &mut cursor)?;

    Ok(EventEnvelope {
        event_id,
        tick,
        sequence,
        stream,
        previous_hash,
        hash: ZERO_HASH,
        payload,
    })
}
