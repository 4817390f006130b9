//! Maps the in-memory model to the compact tag/value form persisted by the
//! caches.
//!
//! Message layouts, by field number:
//!
//! ```text
//! MaybeDocument   1 no_document | 2 document | 3 unknown_document (oneof)
//! Document        1 path, 2 data (Value), 3 update_time (Timestamp)
//! NoDocument      1 path, 2 read_time
//! UnknownDocument 1 path, 2 version
//! Timestamp       1 seconds, 2 nanos
//! Value           one tag per variant, 1 null .. 12 map (see VALUE_*)
//! Mutation        1 set | 2 patch | 3 delete (oneof)
//! Set             1 path, 2 value, 3 precondition
//! Patch           1 path, 2 data, 3 mask, 4 precondition
//! Delete          1 path, 2 precondition
//! Precondition    1 exists | 2 update_time (oneof; absent = none)
//! Target          1 target_id, 2 sequence_number, 3 snapshot_version,
//!                 4 resume_token, 5 documents | 6 query (oneof)
//! Query           1 path, 2 collection_group, 3 filters*, 4 order_bys*
//! Filter          1 field_filter | 2 unary | 3 composite (oneof)
//! FieldPath       repeated 1 segment
//! ```
//!
//! Decoders read tags in a loop, skip unrecognized fields, and keep the
//! last occurrence of a repeated scalar or message field. Duplicates
//! replace, they do not merge; the tests pin that down.

use bytes::Bytes;

use crate::error::{data_loss, StoreResult};
use crate::local::target_data::{QueryPurpose, TargetData};
use crate::model::{
    DatabaseId, Document, DocumentKey, FieldMask, FieldPath, GeoPoint, MaybeDocument, Mutation,
    NoDocument, Precondition, ResourcePath, SnapshotVersion, TargetId, Timestamp, UnknownDocument,
};
use crate::query::{Direction, Filter, Operator, OrderBy, Query, UnaryOperator};
use crate::value::{FieldMap, FieldValue, ObjectValue, ValueKind};
use crate::wire::{Reader, Writer};

const MAYBE_DOCUMENT_NO_DOCUMENT: u32 = 1;
const MAYBE_DOCUMENT_DOCUMENT: u32 = 2;
const MAYBE_DOCUMENT_UNKNOWN_DOCUMENT: u32 = 3;

const VALUE_NULL: u32 = 1;
const VALUE_BOOLEAN: u32 = 2;
const VALUE_INTEGER: u32 = 3;
const VALUE_DOUBLE: u32 = 4;
const VALUE_TIMESTAMP: u32 = 5;
const VALUE_SERVER_TIMESTAMP: u32 = 6;
const VALUE_STRING: u32 = 7;
const VALUE_BLOB: u32 = 8;
const VALUE_REFERENCE: u32 = 9;
const VALUE_GEO_POINT: u32 = 10;
const VALUE_ARRAY: u32 = 11;
const VALUE_MAP: u32 = 12;

const MUTATION_SET: u32 = 1;
const MUTATION_PATCH: u32 = 2;
const MUTATION_DELETE: u32 = 3;

const TARGET_TARGET_ID: u32 = 1;
const TARGET_SEQUENCE_NUMBER: u32 = 2;
const TARGET_SNAPSHOT_VERSION: u32 = 3;
const TARGET_RESUME_TOKEN: u32 = 4;
const TARGET_DOCUMENTS: u32 = 5;
const TARGET_QUERY: u32 = 6;

const FILTER_FIELD: u32 = 1;
const FILTER_UNARY: u32 = 2;
const FILTER_COMPOSITE: u32 = 3;

/// Encodes and decodes persisted records. References inside the
/// serializer's own database are stored without their project and database
/// ids and resolved against it on the way back out.
#[derive(Clone, Debug)]
pub struct LocalSerializer {
    database_id: DatabaseId,
}

impl LocalSerializer {
    pub fn new(database_id: DatabaseId) -> Self {
        Self { database_id }
    }

    pub fn database_id(&self) -> &DatabaseId {
        &self.database_id
    }

    pub fn encode_maybe_document(&self, doc: &MaybeDocument) -> Bytes {
        let mut writer = Writer::new();
        match doc {
            MaybeDocument::NoDocument(no_doc) => {
                writer.write_message(MAYBE_DOCUMENT_NO_DOCUMENT, |message| {
                    message.write_string(1, &no_doc.key().path().canonical_string());
                    self.encode_timestamp(message, 2, no_doc.version().timestamp());
                });
            }
            MaybeDocument::Document(document) => {
                writer.write_message(MAYBE_DOCUMENT_DOCUMENT, |message| {
                    message.write_string(1, &document.key().path().canonical_string());
                    self.encode_value(message, 2, document.data().as_field_value());
                    self.encode_timestamp(message, 3, document.version().timestamp());
                });
            }
            MaybeDocument::UnknownDocument(unknown) => {
                writer.write_message(MAYBE_DOCUMENT_UNKNOWN_DOCUMENT, |message| {
                    message.write_string(1, &unknown.key().path().canonical_string());
                    self.encode_timestamp(message, 2, unknown.version().timestamp());
                });
            }
        }
        writer.into_bytes()
    }

    pub fn decode_maybe_document(&self, bytes: Bytes) -> StoreResult<MaybeDocument> {
        let mut reader = Reader::new(bytes);
        let mut result: Option<MaybeDocument> = None;
        while let Some((field_number, wire_type)) = reader.read_tag() {
            match field_number {
                MAYBE_DOCUMENT_NO_DOCUMENT => {
                    result = self.decode_no_document(&mut reader).map(Into::into);
                }
                MAYBE_DOCUMENT_DOCUMENT => {
                    result = self.decode_document(&mut reader).map(Into::into);
                }
                MAYBE_DOCUMENT_UNKNOWN_DOCUMENT => {
                    result = self.decode_unknown_document(&mut reader).map(Into::into);
                }
                _ => reader.skip_field(wire_type),
            }
        }
        reader.status()?;
        result.ok_or_else(|| {
            data_loss(
                "Invalid MaybeDocument message: Neither 'no_document' nor 'document' fields set.",
            )
        })
    }

    fn decode_document(&self, reader: &mut Reader) -> Option<Document> {
        reader.read_message(|message| {
            let mut key: Option<DocumentKey> = None;
            let mut data = ObjectValue::empty();
            let mut version = SnapshotVersion::NONE;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => key = self.decode_document_key(message),
                    2 => {
                        let value = self.decode_value(message);
                        if value.is_map() {
                            data = ObjectValue::from_field_value(value);
                        } else {
                            message.fail("Document data must be a map value");
                        }
                    }
                    3 => version = SnapshotVersion::new(self.decode_timestamp(message)),
                    _ => message.skip_field(wire_type),
                }
            }
            match key {
                Some(key) => Some(Document::new(key, version, data)),
                None => {
                    message.fail("Document is missing its path");
                    None
                }
            }
        })
    }

    fn decode_no_document(&self, reader: &mut Reader) -> Option<NoDocument> {
        self.decode_key_and_version(reader)
            .map(|(key, version)| NoDocument::new(key, version))
    }

    fn decode_unknown_document(&self, reader: &mut Reader) -> Option<UnknownDocument> {
        self.decode_key_and_version(reader)
            .map(|(key, version)| UnknownDocument::new(key, version))
    }

    fn decode_key_and_version(
        &self,
        reader: &mut Reader,
    ) -> Option<(DocumentKey, SnapshotVersion)> {
        reader.read_message(|message| {
            let mut key: Option<DocumentKey> = None;
            let mut version = SnapshotVersion::NONE;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => key = self.decode_document_key(message),
                    2 => version = SnapshotVersion::new(self.decode_timestamp(message)),
                    _ => message.skip_field(wire_type),
                }
            }
            match key {
                Some(key) => Some((key, version)),
                None => {
                    message.fail("Document record is missing its path");
                    None
                }
            }
        })
    }

    pub fn encode_mutation(&self, mutation: &Mutation) -> Bytes {
        let mut writer = Writer::new();
        match mutation {
            Mutation::Set {
                key,
                value,
                precondition,
            } => {
                writer.write_message(MUTATION_SET, |message| {
                    message.write_string(1, &key.path().canonical_string());
                    self.encode_value(message, 2, value.as_field_value());
                    self.encode_precondition(message, 3, precondition);
                });
            }
            Mutation::Patch {
                key,
                data,
                mask,
                precondition,
            } => {
                writer.write_message(MUTATION_PATCH, |message| {
                    message.write_string(1, &key.path().canonical_string());
                    self.encode_value(message, 2, data.as_field_value());
                    message.write_message(3, |mask_message| {
                        for path in mask.paths() {
                            encode_field_path(mask_message, 1, path);
                        }
                    });
                    self.encode_precondition(message, 4, precondition);
                });
            }
            Mutation::Delete { key, precondition } => {
                writer.write_message(MUTATION_DELETE, |message| {
                    message.write_string(1, &key.path().canonical_string());
                    self.encode_precondition(message, 2, precondition);
                });
            }
        }
        writer.into_bytes()
    }

    pub fn decode_mutation(&self, bytes: Bytes) -> StoreResult<Mutation> {
        let mut reader = Reader::new(bytes);
        let mut result: Option<Mutation> = None;
        while let Some((field_number, wire_type)) = reader.read_tag() {
            match field_number {
                MUTATION_SET => result = self.decode_set_mutation(&mut reader),
                MUTATION_PATCH => result = self.decode_patch_mutation(&mut reader),
                MUTATION_DELETE => result = self.decode_delete_mutation(&mut reader),
                _ => reader.skip_field(wire_type),
            }
        }
        reader.status()?;
        result.ok_or_else(|| data_loss("Invalid Mutation message: no mutation variant set"))
    }

    fn decode_set_mutation(&self, reader: &mut Reader) -> Option<Mutation> {
        reader.read_message(|message| {
            let mut key: Option<DocumentKey> = None;
            let mut value = ObjectValue::empty();
            let mut precondition = Precondition::None;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => key = self.decode_document_key(message),
                    2 => match self.decode_object_value(message) {
                        Some(object) => value = object,
                        None => message.fail("Set mutation value must be a map value"),
                    },
                    3 => precondition = self.decode_precondition(message),
                    _ => message.skip_field(wire_type),
                }
            }
            match key {
                Some(key) => Some(Mutation::set(key, value, precondition)),
                None => {
                    message.fail("Set mutation is missing its path");
                    None
                }
            }
        })
    }

    fn decode_patch_mutation(&self, reader: &mut Reader) -> Option<Mutation> {
        reader.read_message(|message| {
            let mut key: Option<DocumentKey> = None;
            let mut data = ObjectValue::empty();
            let mut mask = FieldMask::new(Vec::new());
            let mut precondition = Precondition::None;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => key = self.decode_document_key(message),
                    2 => match self.decode_object_value(message) {
                        Some(object) => data = object,
                        None => message.fail("Patch mutation data must be a map value"),
                    },
                    3 => mask = self.decode_field_mask(message),
                    4 => precondition = self.decode_precondition(message),
                    _ => message.skip_field(wire_type),
                }
            }
            match key {
                Some(key) => Some(Mutation::patch(key, data, mask, precondition)),
                None => {
                    message.fail("Patch mutation is missing its path");
                    None
                }
            }
        })
    }

    fn decode_delete_mutation(&self, reader: &mut Reader) -> Option<Mutation> {
        reader.read_message(|message| {
            let mut key: Option<DocumentKey> = None;
            let mut precondition = Precondition::None;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => key = self.decode_document_key(message),
                    2 => precondition = self.decode_precondition(message),
                    _ => message.skip_field(wire_type),
                }
            }
            match key {
                Some(key) => Some(Mutation::delete(key, precondition)),
                None => {
                    message.fail("Delete mutation is missing its path");
                    None
                }
            }
        })
    }

    fn encode_precondition(&self, writer: &mut Writer, field_number: u32, precondition: &Precondition) {
        match precondition {
            Precondition::None => {}
            Precondition::Exists(exists) => {
                writer.write_message(field_number, |message| message.write_bool(1, *exists));
            }
            Precondition::UpdateTime(version) => {
                writer.write_message(field_number, |message| {
                    self.encode_timestamp(message, 2, version.timestamp());
                });
            }
        }
    }

    fn decode_precondition(&self, reader: &mut Reader) -> Precondition {
        reader.read_message(|message| {
            let mut precondition = Precondition::None;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => precondition = Precondition::Exists(message.read_bool()),
                    2 => {
                        precondition = Precondition::UpdateTime(SnapshotVersion::new(
                            self.decode_timestamp(message),
                        ));
                    }
                    _ => message.skip_field(wire_type),
                }
            }
            precondition
        })
    }

    fn decode_field_mask(&self, reader: &mut Reader) -> FieldMask {
        reader.read_message(|message| {
            let mut paths = Vec::new();
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => {
                        if let Some(path) = decode_field_path(message) {
                            paths.push(path);
                        }
                    }
                    _ => message.skip_field(wire_type),
                }
            }
            FieldMask::new(paths)
        })
    }

    pub fn encode_target_data(&self, target: &TargetData) -> Bytes {
        let mut writer = Writer::new();
        writer.write_signed_varint(TARGET_TARGET_ID, i64::from(target.target_id()));
        writer.write_signed_varint(TARGET_SEQUENCE_NUMBER, target.sequence_number());
        if target.snapshot_version() != SnapshotVersion::NONE {
            self.encode_timestamp(
                &mut writer,
                TARGET_SNAPSHOT_VERSION,
                target.snapshot_version().timestamp(),
            );
        }
        if !target.resume_token().is_empty() {
            writer.write_bytes(TARGET_RESUME_TOKEN, target.resume_token());
        }
        let query = target.query();
        if query.is_document_query() {
            writer.write_string(TARGET_DOCUMENTS, &query.path().canonical_string());
        } else {
            self.encode_query(&mut writer, TARGET_QUERY, query);
        }
        writer.into_bytes()
    }

    /// Rebuilds target metadata. The purpose of a persisted target is
    /// always a listen; the other purposes are transient.
    pub fn decode_target_data(&self, bytes: Bytes) -> StoreResult<TargetData> {
        let mut reader = Reader::new(bytes);
        let mut target_id: TargetId = 0;
        let mut sequence_number = 0;
        let mut snapshot_version = SnapshotVersion::NONE;
        let mut resume_token = Bytes::new();
        let mut query: Option<Query> = None;
        while let Some((field_number, wire_type)) = reader.read_tag() {
            match field_number {
                TARGET_TARGET_ID => target_id = reader.read_signed_varint() as TargetId,
                TARGET_SEQUENCE_NUMBER => sequence_number = reader.read_signed_varint(),
                TARGET_SNAPSHOT_VERSION => {
                    snapshot_version = SnapshotVersion::new(self.decode_timestamp(&mut reader));
                }
                TARGET_RESUME_TOKEN => resume_token = reader.read_bytes(),
                // the two target shapes form a oneof: reading either
                // replaces whatever the other put here
                TARGET_DOCUMENTS => {
                    query = self
                        .decode_resource_path(&mut reader)
                        .map(Query::new);
                }
                TARGET_QUERY => query = Some(self.decode_query(&mut reader)),
                _ => reader.skip_field(wire_type),
            }
        }
        reader.status()?;
        let query = query.ok_or_else(|| {
            data_loss("Invalid Target message: Neither 'documents' nor 'query' fields set.")
        })?;
        Ok(
            TargetData::new(query, target_id, sequence_number, QueryPurpose::Listen)
                .with_resume_token(resume_token, snapshot_version),
        )
    }

    fn encode_query(&self, writer: &mut Writer, field_number: u32, query: &Query) {
        writer.write_message(field_number, |message| {
            if !query.path().is_empty() {
                message.write_string(1, &query.path().canonical_string());
            }
            if let Some(collection_group) = query.collection_group() {
                message.write_string(2, collection_group);
            }
            for filter in query.filters() {
                self.encode_filter(message, 3, filter);
            }
            for order_by in query.explicit_order_bys() {
                encode_order_by(message, 4, order_by);
            }
        });
    }

    fn decode_query(&self, reader: &mut Reader) -> Query {
        reader.read_message(|message| {
            let mut path = ResourcePath::empty();
            let mut collection_group = None;
            let mut filters = Vec::new();
            let mut order_bys = Vec::new();
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => {
                        if let Some(decoded) = self.decode_resource_path(message) {
                            path = decoded;
                        }
                    }
                    2 => collection_group = Some(message.read_string()),
                    3 => {
                        if let Some(filter) = self.decode_filter(message) {
                            filters.push(filter);
                        }
                    }
                    4 => {
                        if let Some(order_by) = decode_order_by(message) {
                            order_bys.push(order_by);
                        }
                    }
                    _ => message.skip_field(wire_type),
                }
            }
            Query::from_parts(path, collection_group, filters, order_bys)
        })
    }

    fn encode_filter(&self, writer: &mut Writer, field_number: u32, filter: &Filter) {
        writer.write_message(field_number, |message| match filter {
            Filter::Field(field_filter) => {
                message.write_message(FILTER_FIELD, |body| {
                    encode_field_path(body, 1, field_filter.field());
                    body.write_varint(2, encode_operator(field_filter.op()));
                    self.encode_value(body, 3, field_filter.value());
                });
            }
            Filter::Unary(unary) => {
                message.write_message(FILTER_UNARY, |body| {
                    encode_field_path(body, 1, unary.field());
                    body.write_varint(
                        2,
                        match unary.op() {
                            UnaryOperator::IsNull => 1,
                            UnaryOperator::IsNan => 2,
                        },
                    );
                });
            }
            Filter::Composite(composite) => {
                message.write_message(FILTER_COMPOSITE, |body| {
                    for child in composite.filters() {
                        self.encode_filter(body, 1, child);
                    }
                });
            }
        });
    }

    fn decode_filter(&self, reader: &mut Reader) -> Option<Filter> {
        reader.read_message(|message| {
            let mut filter = None;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    FILTER_FIELD => filter = self.decode_field_filter(message),
                    FILTER_UNARY => filter = decode_unary_filter(message),
                    FILTER_COMPOSITE => filter = self.decode_composite_filter(message),
                    _ => message.skip_field(wire_type),
                }
            }
            if filter.is_none() {
                message.fail("Invalid Filter message: no filter variant set");
            }
            filter
        })
    }

    fn decode_field_filter(&self, reader: &mut Reader) -> Option<Filter> {
        reader.read_message(|message| {
            let mut field = None;
            let mut op = None;
            let mut value = FieldValue::null();
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => field = decode_field_path(message),
                    2 => {
                        let raw = message.read_varint();
                        op = decode_operator(raw);
                        if op.is_none() {
                            message.fail(format!("Unknown filter operator {raw}"));
                        }
                    }
                    3 => value = self.decode_value(message),
                    _ => message.skip_field(wire_type),
                }
            }
            match (field, op) {
                (Some(field), Some(op)) => Some(Filter::from_parts(field, op, value)),
                _ => {
                    message.fail("Field filter is missing its field or operator");
                    None
                }
            }
        })
    }

    fn decode_composite_filter(&self, reader: &mut Reader) -> Option<Filter> {
        reader.read_message(|message| {
            let mut children = Vec::new();
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => {
                        if let Some(child) = self.decode_filter(message) {
                            children.push(child);
                        }
                    }
                    _ => message.skip_field(wire_type),
                }
            }
            Some(Filter::and(children))
        })
    }

    fn encode_value(&self, writer: &mut Writer, field_number: u32, value: &FieldValue) {
        writer.write_message(field_number, |message| {
            self.encode_value_fields(message, value);
        });
    }

    fn encode_value_fields(&self, message: &mut Writer, value: &FieldValue) {
        match value.kind() {
            ValueKind::Null => message.write_varint(VALUE_NULL, 0),
            ValueKind::Boolean(value) => message.write_bool(VALUE_BOOLEAN, *value),
            ValueKind::Integer(value) => message.write_signed_varint(VALUE_INTEGER, *value),
            ValueKind::Double(value) => message.write_double(VALUE_DOUBLE, *value),
            ValueKind::Timestamp(value) => self.encode_timestamp(message, VALUE_TIMESTAMP, *value),
            ValueKind::ServerTimestamp(value) => {
                message.write_message(VALUE_SERVER_TIMESTAMP, |body| {
                    self.encode_timestamp(body, 1, value.local_write_time);
                    if let Some(previous) = &value.previous_value {
                        self.encode_value(body, 2, previous);
                    }
                });
            }
            ValueKind::String(value) => message.write_string(VALUE_STRING, value),
            ValueKind::Blob(value) => message.write_bytes(VALUE_BLOB, value),
            ValueKind::Reference(reference) => {
                message.write_message(VALUE_REFERENCE, |body| {
                    if reference.database_id != self.database_id {
                        body.write_string(1, reference.database_id.project_id());
                        body.write_string(2, reference.database_id.database());
                    }
                    body.write_string(3, &reference.key.path().canonical_string());
                });
            }
            ValueKind::GeoPoint(point) => {
                message.write_message(VALUE_GEO_POINT, |body| {
                    body.write_double(1, point.latitude());
                    body.write_double(2, point.longitude());
                });
            }
            ValueKind::Array(values) => {
                message.write_message(VALUE_ARRAY, |body| {
                    for element in values {
                        self.encode_value(body, 1, element);
                    }
                });
            }
            ValueKind::Map(map) => {
                message.write_message(VALUE_MAP, |body| {
                    for (key, entry_value) in map.iter() {
                        body.write_message(1, |entry| {
                            entry.write_string(1, key);
                            self.encode_value(entry, 2, entry_value);
                        });
                    }
                });
            }
        }
    }

    fn decode_value(&self, reader: &mut Reader) -> FieldValue {
        reader.read_message(|message| {
            let mut value = FieldValue::null();
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    VALUE_NULL => {
                        message.read_varint();
                        value = FieldValue::null();
                    }
                    VALUE_BOOLEAN => value = FieldValue::from_bool(message.read_bool()),
                    VALUE_INTEGER => value = FieldValue::from_integer(message.read_signed_varint()),
                    VALUE_DOUBLE => value = FieldValue::from_double(message.read_double()),
                    VALUE_TIMESTAMP => {
                        value = FieldValue::from_timestamp(self.decode_timestamp(message));
                    }
                    VALUE_SERVER_TIMESTAMP => value = self.decode_server_timestamp(message),
                    VALUE_STRING => value = FieldValue::from_string(message.read_string()),
                    VALUE_BLOB => value = FieldValue::from_blob(message.read_bytes().to_vec()),
                    VALUE_REFERENCE => value = self.decode_reference(message),
                    VALUE_GEO_POINT => value = self.decode_geo_point(message),
                    VALUE_ARRAY => value = self.decode_array(message),
                    VALUE_MAP => value = FieldValue::from_map(self.decode_map_value(message)),
                    _ => message.skip_field(wire_type),
                }
            }
            value
        })
    }

    /// Decodes a value and requires it to be map-typed.
    fn decode_object_value(&self, reader: &mut Reader) -> Option<ObjectValue> {
        let value = self.decode_value(reader);
        if value.is_map() {
            Some(ObjectValue::from_field_value(value))
        } else {
            None
        }
    }

    fn decode_server_timestamp(&self, reader: &mut Reader) -> FieldValue {
        reader.read_message(|message| {
            let mut local_write_time = Timestamp::new(0, 0);
            let mut previous_value = None;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => local_write_time = self.decode_timestamp(message),
                    2 => previous_value = Some(self.decode_value(message)),
                    _ => message.skip_field(wire_type),
                }
            }
            FieldValue::from_server_timestamp(local_write_time, previous_value)
        })
    }

    fn decode_reference(&self, reader: &mut Reader) -> FieldValue {
        reader.read_message(|message| {
            let mut project_id = self.database_id.project_id().to_string();
            let mut database = self.database_id.database().to_string();
            let mut key = None;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => project_id = message.read_string(),
                    2 => database = message.read_string(),
                    3 => key = self.decode_document_key(message),
                    _ => message.skip_field(wire_type),
                }
            }
            match key {
                Some(key) => FieldValue::from_reference(DatabaseId::new(project_id, database), key),
                None => {
                    message.fail("Reference value is missing its document path");
                    FieldValue::null()
                }
            }
        })
    }

    fn decode_geo_point(&self, reader: &mut Reader) -> FieldValue {
        reader.read_message(|message| {
            let mut latitude = 0.0;
            let mut longitude = 0.0;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => latitude = message.read_double(),
                    2 => longitude = message.read_double(),
                    _ => message.skip_field(wire_type),
                }
            }
            match GeoPoint::new(latitude, longitude) {
                Ok(point) => FieldValue::from_geo_point(point),
                Err(err) => {
                    message.fail(err.message().to_string());
                    FieldValue::null()
                }
            }
        })
    }

    fn decode_array(&self, reader: &mut Reader) -> FieldValue {
        reader.read_message(|message| {
            let mut values = Vec::new();
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => values.push(self.decode_value(message)),
                    _ => message.skip_field(wire_type),
                }
            }
            FieldValue::from_array(values)
        })
    }

    fn decode_map_value(&self, reader: &mut Reader) -> FieldMap {
        reader.read_message(|message| {
            let mut map = FieldMap::new();
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => {
                        let (key, value) = message.read_message(|entry| {
                            let mut key = String::new();
                            let mut value = FieldValue::null();
                            while let Some((entry_field, entry_wire)) = entry.read_tag() {
                                match entry_field {
                                    1 => key = entry.read_string(),
                                    2 => value = self.decode_value(entry),
                                    _ => entry.skip_field(entry_wire),
                                }
                            }
                            (key, value)
                        });
                        map = map.insert(key, value);
                    }
                    _ => message.skip_field(wire_type),
                }
            }
            map
        })
    }

    fn encode_timestamp(&self, writer: &mut Writer, field_number: u32, timestamp: Timestamp) {
        writer.write_message(field_number, |message| {
            if timestamp.seconds != 0 {
                message.write_signed_varint(1, timestamp.seconds);
            }
            if timestamp.nanos != 0 {
                message.write_varint(2, timestamp.nanos as u64);
            }
        });
    }

    fn decode_timestamp(&self, reader: &mut Reader) -> Timestamp {
        reader.read_message(|message| {
            let mut seconds = 0;
            let mut nanos = 0;
            while let Some((field_number, wire_type)) = message.read_tag() {
                match field_number {
                    1 => seconds = message.read_signed_varint(),
                    2 => nanos = message.read_varint() as i32,
                    _ => message.skip_field(wire_type),
                }
            }
            Timestamp::new(seconds, nanos)
        })
    }

    fn decode_document_key(&self, reader: &mut Reader) -> Option<DocumentKey> {
        let raw = reader.read_string();
        match DocumentKey::from_string(&raw) {
            Ok(key) => Some(key),
            Err(err) => {
                reader.fail(err.message().to_string());
                None
            }
        }
    }

    fn decode_resource_path(&self, reader: &mut Reader) -> Option<ResourcePath> {
        let raw = reader.read_string();
        match ResourcePath::from_string(&raw) {
            Ok(path) => Some(path),
            Err(err) => {
                reader.fail(err.message().to_string());
                None
            }
        }
    }
}

fn encode_field_path(writer: &mut Writer, field_number: u32, path: &FieldPath) {
    writer.write_message(field_number, |message| {
        for segment in path.segments() {
            message.write_string(1, segment);
        }
    });
}

fn decode_field_path(reader: &mut Reader) -> Option<FieldPath> {
    reader.read_message(|message| {
        let mut segments = Vec::new();
        while let Some((field_number, wire_type)) = message.read_tag() {
            match field_number {
                1 => segments.push(message.read_string()),
                _ => message.skip_field(wire_type),
            }
        }
        match FieldPath::new(segments) {
            Ok(path) => Some(path),
            Err(err) => {
                message.fail(err.message().to_string());
                None
            }
        }
    })
}

fn encode_order_by(writer: &mut Writer, field_number: u32, order_by: &OrderBy) {
    writer.write_message(field_number, |message| {
        encode_field_path(message, 1, order_by.field());
        if order_by.direction() == Direction::Descending {
            message.write_varint(2, 1);
        }
    });
}

fn decode_order_by(reader: &mut Reader) -> Option<OrderBy> {
    reader.read_message(|message| {
        let mut field = None;
        let mut direction = Direction::Ascending;
        while let Some((field_number, wire_type)) = message.read_tag() {
            match field_number {
                1 => field = decode_field_path(message),
                2 => {
                    direction = match message.read_varint() {
                        0 => Direction::Ascending,
                        1 => Direction::Descending,
                        raw => {
                            message.fail(format!("Unknown order-by direction {raw}"));
                            Direction::Ascending
                        }
                    };
                }
                _ => message.skip_field(wire_type),
            }
        }
        field.map(|field| OrderBy::new(field, direction))
    })
}

fn encode_operator(op: Operator) -> u64 {
    match op {
        Operator::LessThan => 1,
        Operator::LessThanOrEqual => 2,
        Operator::Equal => 3,
        Operator::NotEqual => 4,
        Operator::GreaterThan => 5,
        Operator::GreaterThanOrEqual => 6,
        Operator::ArrayContains => 7,
        Operator::In => 8,
        Operator::ArrayContainsAny => 9,
        Operator::NotIn => 10,
    }
}

fn decode_operator(raw: u64) -> Option<Operator> {
    match raw {
        1 => Some(Operator::LessThan),
        2 => Some(Operator::LessThanOrEqual),
        3 => Some(Operator::Equal),
        4 => Some(Operator::NotEqual),
        5 => Some(Operator::GreaterThan),
        6 => Some(Operator::GreaterThanOrEqual),
        7 => Some(Operator::ArrayContains),
        8 => Some(Operator::In),
        9 => Some(Operator::ArrayContainsAny),
        10 => Some(Operator::NotIn),
        _ => None,
    }
}

fn decode_unary_filter(reader: &mut Reader) -> Option<Filter> {
    reader.read_message(|message| {
        let mut field = None;
        let mut op = None;
        while let Some((field_number, wire_type)) = message.read_tag() {
            match field_number {
                1 => field = decode_field_path(message),
                2 => {
                    op = match message.read_varint() {
                        1 => Some(UnaryOperator::IsNull),
                        2 => Some(UnaryOperator::IsNan),
                        raw => {
                            message.fail(format!("Unknown unary filter operator {raw}"));
                            None
                        }
                    };
                }
                _ => message.skip_field(wire_type),
            }
        }
        match (field, op) {
            (Some(field), Some(UnaryOperator::IsNull)) => Some(Filter::is_null(field)),
            (Some(field), Some(UnaryOperator::IsNan)) => Some(Filter::is_nan(field)),
            _ => {
                message.fail("Unary filter is missing its field or operator");
                None
            }
        }
    })
}
