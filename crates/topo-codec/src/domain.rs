//! Canonical shapes for the topology domain: plates, boundaries, junctions,
//! and the snapshot that bundles a sorted view of all three.
//!
//! These are the wire/storage shapes only — folding events into them, and
//! deciding when an update is legal, is `topo-materialize`'s job (spec.md
//! §4.7.1). This crate only has to encode and decode them canonically.

use bytes::{Buf, BufMut, BytesMut};
use topo_types::{BoundaryId, CanonicalTick, JunctionId, PlateId, Sequence, StreamIdentity};

use crate::primitives::{
    read_array_header, read_f64_blob, read_guid, read_ivarint, read_presence, read_str,
    read_uvarint, write_array_header, write_f64_blob, write_guid, write_ivarint, write_presence,
    write_str, write_uvarint,
};
use crate::CodecError;

/// A point on (or near) the unit sphere, carried as opaque coordinate data.
/// Geometry math (projection, distance, interpolation) is a domain-solver
/// concern outside this crate's scope; here it is just three numbers that
/// must round-trip bit-exactly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryPoint {
    /// X coordinate.
    pub x: f64,
    /// Y coordinate.
    pub y: f64,
    /// Z coordinate.
    pub z: f64,
}

impl GeometryPoint {
    fn write(&self, buf: &mut BytesMut) {
        write_f64_blob(buf, &[self.x, self.y, self.z]);
    }

    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        let values = read_f64_blob(buf)?;
        if values.len() != 3 {
            return Err(CodecError::InvalidGeometryArity { expected: 3, actual: values.len() });
        }
        Ok(GeometryPoint { x: values[0], y: values[1], z: values[2] })
    }
}

/// A boundary's classification. Kinematic interpretation (what convergence
/// or divergence implies for the solver) is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryType {
    /// Plates move toward each other.
    Convergent,
    /// Plates move apart.
    Divergent,
    /// Plates slide laterally past each other.
    Transform,
}

impl BoundaryType {
    pub(crate) fn tag(self) -> u8 {
        match self {
            BoundaryType::Convergent => 0,
            BoundaryType::Divergent => 1,
            BoundaryType::Transform => 2,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Result<Self, CodecError> {
        match tag {
            0 => Ok(BoundaryType::Convergent),
            1 => Ok(BoundaryType::Divergent),
            2 => Ok(BoundaryType::Transform),
            other => Err(CodecError::UnknownDiscriminant { what: "BoundaryType", tag: other }),
        }
    }

    fn write(self, buf: &mut BytesMut) {
        buf.put_u8(self.tag());
    }

    fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        if !buf.has_remaining() {
            return Err(CodecError::Truncated);
        }
        Self::from_tag(buf.get_u8())
    }
}

/// A tectonic plate as it exists in a materialized state view or snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Plate {
    /// Plate identifier.
    pub id: PlateId,
    /// Whether the plate has been retired (monotonic — never un-retired).
    pub retired: bool,
}

impl Plate {
    pub(crate) fn write(&self, buf: &mut BytesMut) {
        write_array_header(buf, 2);
        write_guid(buf, &self.id);
        write_presence(buf, self.retired);
    }

    pub(crate) fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        expect_arity(buf, 2)?;
        let id = read_guid(buf)?;
        let retired = read_presence(buf)?;
        Ok(Plate { id, retired })
    }
}

/// A plate boundary as it exists in a materialized state view or snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Boundary {
    /// Boundary identifier.
    pub id: BoundaryId,
    /// Plate on the left side of the boundary.
    pub plate_id_left: PlateId,
    /// Plate on the right side of the boundary.
    pub plate_id_right: PlateId,
    /// Current classification.
    pub boundary_type: BoundaryType,
    /// Current geometry (opaque control points).
    pub geometry: Vec<f64>,
    /// Whether the boundary has been retired.
    pub retired: bool,
}

impl Boundary {
    pub(crate) fn write(&self, buf: &mut BytesMut) {
        write_array_header(buf, 6);
        write_guid(buf, &self.id);
        write_guid(buf, &self.plate_id_left);
        write_guid(buf, &self.plate_id_right);
        self.boundary_type.write(buf);
        write_f64_blob(buf, &self.geometry);
        write_presence(buf, self.retired);
    }

    pub(crate) fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        expect_arity(buf, 6)?;
        let id = read_guid(buf)?;
        let plate_id_left = read_guid(buf)?;
        let plate_id_right = read_guid(buf)?;
        let boundary_type = BoundaryType::read(buf)?;
        let geometry = read_f64_blob(buf)?;
        let retired = read_presence(buf)?;
        Ok(Boundary { id, plate_id_left, plate_id_right, boundary_type, geometry, retired })
    }
}

/// A junction where boundaries meet, as it exists in a materialized state
/// view or snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Junction {
    /// Junction identifier.
    pub id: JunctionId,
    /// Boundaries incident to this junction.
    pub boundary_ids: Vec<BoundaryId>,
    /// Current location.
    pub location: GeometryPoint,
    /// Whether the junction has been retired.
    pub retired: bool,
}

impl Junction {
    pub(crate) fn write(&self, buf: &mut BytesMut) {
        write_array_header(buf, 4);
        write_guid(buf, &self.id);
        write_array_header(buf, self.boundary_ids.len() as u32);
        for b in &self.boundary_ids {
            write_guid(buf, b);
        }
        self.location.write(buf);
        write_presence(buf, self.retired);
    }

    pub(crate) fn read(buf: &mut impl Buf) -> Result<Self, CodecError> {
        expect_arity(buf, 4)?;
        let id = read_guid(buf)?;
        let count = read_array_header(buf)?;
        let mut boundary_ids = Vec::with_capacity(count as usize);
        for _ in 0..count {
            boundary_ids.push(read_guid(buf)?);
        }
        let location = GeometryPoint::read(buf)?;
        let retired = read_presence(buf)?;
        Ok(Junction { id, boundary_ids, location, retired })
    }
}

/// Identifies exactly which prefix of a stream a snapshot summarizes.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotKey {
    /// Stream the snapshot belongs to.
    pub stream: StreamIdentity,
    /// Tick the snapshot is filed under.
    pub tick: CanonicalTick,
    /// Exact last event sequence folded into the snapshot.
    pub last_event_sequence: Sequence,
}

/// A persisted materialization: sorted plates/boundaries/junctions plus the
/// exact sequence they summarize (spec.md §3.6).
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Identifies the exact content this snapshot summarizes.
    pub key: SnapshotKey,
    /// Last event sequence folded (duplicated from `key` for direct access
    /// by incremental replay, which resumes from here rather than from the
    /// tick — see spec.md §3.6).
    pub last_event_sequence: Sequence,
    /// Plates sorted by canonical GUID order.
    pub plates: Vec<Plate>,
    /// Boundaries sorted by canonical GUID order.
    pub boundaries: Vec<Boundary>,
    /// Junctions sorted by canonical GUID order.
    pub junctions: Vec<Junction>,
}

/// Canonically encodes a [`Snapshot`] for storage under a `Snap:` key.
pub fn encode_snapshot(snapshot: &Snapshot) -> Vec<u8> {
    let mut buf = BytesMut::new();
    write_array_header(&mut buf, 5);

    write_array_header(&mut buf, 3);
    write_stream_identity(&mut buf, &snapshot.key.stream);
    write_ivarint(&mut buf, snapshot.key.tick);
    write_ivarint(&mut buf, snapshot.key.last_event_sequence);

    write_ivarint(&mut buf, snapshot.last_event_sequence);

    write_array_header(&mut buf, snapshot.plates.len() as u32);
    for p in &snapshot.plates {
        p.write(&mut buf);
    }
    write_array_header(&mut buf, snapshot.boundaries.len() as u32);
    for b in &snapshot.boundaries {
        b.write(&mut buf);
    }
    write_array_header(&mut buf, snapshot.junctions.len() as u32);
    for j in &snapshot.junctions {
        j.write(&mut buf);
    }

    buf.to_vec()
}

/// Decodes a [`Snapshot`] written by [`encode_snapshot`].
pub fn decode_snapshot(bytes: &[u8]) -> Result<Snapshot, CodecError> {
    let mut cursor = bytes;
    expect_arity(&mut cursor, 5)?;

    expect_arity(&mut cursor, 3)?;
    let stream = read_stream_identity(&mut cursor)?;
    let tick = read_ivarint(&mut cursor)?;
    let key_last_event_sequence = read_ivarint(&mut cursor)?;

    let last_event_sequence = read_ivarint(&mut cursor)?;

    let plate_count = read_array_header(&mut cursor)?;
    let mut plates = Vec::with_capacity(plate_count as usize);
    for _ in 0..plate_count {
        plates.push(Plate::read(&mut cursor)?);
    }

    let boundary_count = read_array_header(&mut cursor)?;
    let mut boundaries = Vec::with_capacity(boundary_count as usize);
    for _ in 0..boundary_count {
        boundaries.push(Boundary::read(&mut cursor)?);
    }

    let junction_count = read_array_header(&mut cursor)?;
    let mut junctions = Vec::with_capacity(junction_count as usize);
    for _ in 0..junction_count {
        junctions.push(Junction::read(&mut cursor)?);
    }

    Ok(Snapshot {
        key: SnapshotKey { stream, tick, last_event_sequence: key_last_event_sequence },
        last_event_sequence,
        plates,
        boundaries,
        junctions,
    })
}

pub(crate) fn write_stream_identity(buf: &mut BytesMut, stream: &StreamIdentity) {
    write_array_header(buf, 5);
    write_str(buf, &stream.variant_id);
    write_str(buf, &stream.branch_id);
    write_uvarint(buf, stream.l_level);
    write_str(buf, &stream.domain);
    write_str(buf, &stream.model);
}

pub(crate) fn read_stream_identity(buf: &mut impl Buf) -> Result<StreamIdentity, CodecError> {
    expect_arity(buf, 5)?;
    let variant_id = read_str(buf)?;
    let branch_id = read_str(buf)?;
    let l_level = read_uvarint(buf)?;
    let domain = read_str(buf)?;
    let model = read_str(buf)?;
    StreamIdentity::new(variant_id, branch_id, l_level, domain, model)
        .map_err(|e| CodecError::InvalidStreamIdentity(e.to_string()))
}

pub(crate) fn expect_arity(buf: &mut impl Buf, expected: u32) -> Result<(), CodecError> {
    let actual = read_array_header(buf)?;
    if actual != expected {
        return Err(CodecError::UnexpectedArity { expected, actual });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_snapshot() -> Snapshot {
        let stream = StreamIdentity::new("v1", "main", 0, "topology.plates", "euler").unwrap();
        let plate = Plate { id: Uuid::from_u128(1), retired: false };
        let boundary = Boundary {
            id: Uuid::from_u128(2),
            plate_id_left: Uuid::from_u128(1),
            plate_id_right: Uuid::from_u128(3),
            boundary_type: BoundaryType::Convergent,
            geometry: vec![0.0, 1.5, -2.25],
            retired: false,
        };
        let junction = Junction {
            id: Uuid::from_u128(4),
            boundary_ids: vec![Uuid::from_u128(2)],
            location: GeometryPoint { x: 0.0, y: 0.0, z: 1.0 },
            retired: false,
        };
        Snapshot {
            key: SnapshotKey { stream, tick: 100, last_event_sequence: 9 },
            last_event_sequence: 9,
            plates: vec![plate],
            boundaries: vec![boundary],
            junctions: vec![junction],
        }
    }

    #[test]
    fn snapshot_roundtrips() {
        let snap = sample_snapshot();
        let bytes = encode_snapshot(&snap);
        let decoded = decode_snapshot(&bytes).unwrap();
        assert_eq!(decoded, snap);
    }

    #[test]
    fn snapshot_encoding_is_deterministic() {
        let snap = sample_snapshot();
        assert_eq!(encode_snapshot(&snap), encode_snapshot(&snap));
    }

    #[test]
    fn unknown_boundary_type_tag_is_corruption() {
        assert!(matches!(
            BoundaryType::from_tag(99),
            Err(CodecError::UnknownDiscriminant { what: "BoundaryType", tag: 99 })
        ));
    }
}
