//! Columnar array codec.
//!
//! Three dataset layouts:
//!
//! ```text
//! homogeneous   [T; len]                         DType::Scalar(T)
//! compound      [row; len], row = col0|col1|...  DType::Compound(fields)
//! text          [u32 len | utf8 bytes]*          DType::Text
//! ```
//!
//! A text column inside a compound row is a fixed-width cell holding a u32
//! byte length, the UTF-8 bytes, and NUL padding up to the widest value.
//!
//! Variable-length numeric rows ("ragged" columns) are stored as a group with
//! a flat `data` dataset holding every row back to back and an `index`
//! compound dataset of `(start_index, stop_index)` pairs, one per row.
//! Scalars are packed in native byte order through `bytemuck`.

use crate::error::{Result, StoreError};
use crate::store::{join_path, CompoundField, DType, Dataset, FieldType, Node};
use crate::types::{ArrayValue, ScalarType};
use bytemuck::Pod;

pub const RAGGED_DATA: &str = "data";
pub const RAGGED_INDEX: &str = "index";
pub const START_INDEX: &str = "start_index";
pub const STOP_INDEX: &str = "stop_index";

/// Byte-length prefix at the head of every compound text cell
const TEXT_PREFIX: usize = std::mem::size_of::<u32>();

/// One column of a structured dataset
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Scalar(ArrayValue),
    Text(Vec<String>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Scalar(values) => values.len(),
            Column::Text(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn field_type(&self) -> FieldType {
        match self {
            Column::Scalar(values) => FieldType::Scalar(values.scalar_type()),
            Column::Text(values) => {
                FieldType::FixedStr(TEXT_PREFIX + values.iter().map(String::len).max().unwrap_or(0))
            }
        }
    }
}

/// Columns decoded from a compound dataset, addressable by title
#[derive(Debug, Clone)]
pub struct ColumnSet {
    path: String,
    len: usize,
    columns: Vec<(String, Column)>,
}

impl ColumnSet {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|(name, _)| name.as_str())
    }

    /// `None` when the stored schema has no such column
    pub fn get(&self, name: &str) -> Option<&Column> {
        self.columns
            .iter()
            .find(|(title, _)| title == name)
            .map(|(_, column)| column)
    }

    pub fn take(&mut self, name: &str) -> Option<Column> {
        let idx = self.columns.iter().position(|(title, _)| title == name)?;
        Some(self.columns.swap_remove(idx).1)
    }

    /// Remaining columns in stored order
    pub fn into_columns(self) -> Vec<(String, Column)> {
        self.columns
    }

    /// Take a column, filling it from `default` when the stored schema lacks it.
    pub fn require<F>(&mut self, name: &str, default: Option<F>) -> Result<Column>
    where
        F: FnOnce(usize) -> Column,
    {
        let len = self.len;
        match (self.take(name), default) {
            (Some(column), _) => Ok(column),
            (None, Some(factory)) => Ok(factory(len)),
            (None, None) => Err(StoreError::missing_field(&self.path, name)),
        }
    }
}

fn push_pod<T: Pod>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(bytemuck::bytes_of(&value));
}

fn read_pod<T: Pod>(bytes: &[u8]) -> T {
    bytemuck::pod_read_unaligned(bytes)
}

fn decode_all<T: Pod>(data: &[u8]) -> Vec<T> {
    data.chunks_exact(std::mem::size_of::<T>())
        .map(read_pod::<T>)
        .collect()
}

fn array_bytes(values: &ArrayValue) -> Vec<u8> {
    match values {
        ArrayValue::Bool(v) => v.iter().map(|b| u8::from(*b)).collect(),
        ArrayValue::U8(v) => v.clone(),
        ArrayValue::I32(v) => bytemuck::cast_slice(v).to_vec(),
        ArrayValue::I64(v) => bytemuck::cast_slice(v).to_vec(),
        ArrayValue::F32(v) => bytemuck::cast_slice(v).to_vec(),
        ArrayValue::F64(v) => bytemuck::cast_slice(v).to_vec(),
    }
}

fn array_from_bytes(ty: ScalarType, data: &[u8]) -> ArrayValue {
    match ty {
        ScalarType::Bool => ArrayValue::Bool(data.iter().map(|b| *b != 0).collect()),
        ScalarType::U8 => ArrayValue::U8(data.to_vec()),
        ScalarType::I32 => ArrayValue::I32(decode_all(data)),
        ScalarType::I64 => ArrayValue::I64(decode_all(data)),
        ScalarType::F32 => ArrayValue::F32(decode_all(data)),
        ScalarType::F64 => ArrayValue::F64(decode_all(data)),
    }
}

fn check_size(dataset: &Dataset, path: &str) -> Result<()> {
    if let Some(width) = dataset.dtype.row_width() {
        if dataset.data.len() != dataset.len * width {
            return Err(StoreError::corrupt(
                path,
                format!(
                    "dataset holds {} bytes, expected {} rows of {} bytes",
                    dataset.data.len(),
                    dataset.len,
                    width
                ),
            ));
        }
    }
    Ok(())
}

/// Encode a homogeneous array as a flat dataset
pub fn encode_array(values: &ArrayValue) -> Dataset {
    Dataset {
        dtype: DType::Scalar(values.scalar_type()),
        len: values.len(),
        data: array_bytes(values),
    }
}

pub fn decode_array(dataset: &Dataset, path: &str) -> Result<ArrayValue> {
    let DType::Scalar(ty) = dataset.dtype else {
        return Err(StoreError::corrupt(path, "expected a homogeneous array dataset"));
    };
    check_size(dataset, path)?;
    Ok(array_from_bytes(ty, &dataset.data))
}

pub fn write_array(node: &Node, key: &str, values: &ArrayValue) -> Result<()> {
    node.write_dataset(key, encode_array(values))?;
    Ok(())
}

/// Read the array stored at `key`; `Ok(None)` when nothing is stored there
pub fn read_array(node: &Node, key: &str) -> Result<Option<ArrayValue>> {
    let child = node.child(key)?;
    match child.dataset()? {
        Some(dataset) => decode_array(&dataset, child.path()).map(Some),
        None => Ok(None),
    }
}

pub fn encode_strings(values: &[String]) -> Dataset {
    let mut data = Vec::with_capacity(values.iter().map(|s| s.len() + 4).sum());
    for value in values {
        push_pod(&mut data, value.len() as u32);
        data.extend_from_slice(value.as_bytes());
    }
    Dataset {
        dtype: DType::Text,
        len: values.len(),
        data,
    }
}

pub fn decode_strings(dataset: &Dataset, path: &str) -> Result<Vec<String>> {
    if dataset.dtype != DType::Text {
        return Err(StoreError::corrupt(path, "expected a text dataset"));
    }
    let mut values = Vec::with_capacity(dataset.len);
    let mut cursor = 0;
    let data = &dataset.data;
    for _ in 0..dataset.len {
        if cursor + 4 > data.len() {
            return Err(StoreError::corrupt(path, "text dataset truncated"));
        }
        let len = read_pod::<u32>(&data[cursor..cursor + 4]) as usize;
        cursor += 4;
        let bytes = data
            .get(cursor..cursor + len)
            .ok_or_else(|| StoreError::corrupt(path, "text dataset truncated"))?;
        let value = std::str::from_utf8(bytes)
            .map_err(|e| StoreError::corrupt(path, format!("invalid utf-8: {}", e)))?;
        values.push(value.to_string());
        cursor += len;
    }
    if cursor != data.len() {
        return Err(StoreError::corrupt(path, "trailing bytes in text dataset"));
    }
    Ok(values)
}

pub fn write_strings(node: &Node, key: &str, values: &[String]) -> Result<()> {
    node.write_dataset(key, encode_strings(values))?;
    Ok(())
}

pub fn read_strings(node: &Node, key: &str) -> Result<Option<Vec<String>>> {
    let child = node.child(key)?;
    match child.dataset()? {
        Some(dataset) => decode_strings(&dataset, child.path()).map(Some),
        None => Ok(None),
    }
}

/// Pack same-length titled columns into one fixed-width row dataset
pub fn encode_columns(path: &str, length: usize, columns: &[(String, Column)]) -> Result<Dataset> {
    let mut fields = Vec::with_capacity(columns.len());
    for (name, column) in columns {
        if column.len() != length {
            return Err(StoreError::schema(
                path,
                format!("column '{}' has {} rows, expected {}", name, column.len(), length),
            ));
        }
        fields.push(CompoundField {
            name: name.clone(),
            ty: column.field_type(),
        });
    }
    let row_width: usize = fields.iter().map(|f| f.ty.width()).sum();
    let mut data = Vec::with_capacity(row_width * length);
    for row in 0..length {
        for ((_, column), field) in columns.iter().zip(&fields) {
            match column {
                Column::Scalar(values) => match values {
                    ArrayValue::Bool(v) => data.push(u8::from(v[row])),
                    ArrayValue::U8(v) => data.push(v[row]),
                    ArrayValue::I32(v) => push_pod(&mut data, v[row]),
                    ArrayValue::I64(v) => push_pod(&mut data, v[row]),
                    ArrayValue::F32(v) => push_pod(&mut data, v[row]),
                    ArrayValue::F64(v) => push_pod(&mut data, v[row]),
                },
                Column::Text(values) => {
                    let bytes = values[row].as_bytes();
                    push_pod(&mut data, bytes.len() as u32);
                    data.extend_from_slice(bytes);
                    data.resize(data.len() + field.ty.width() - TEXT_PREFIX - bytes.len(), 0);
                }
            }
        }
    }
    Ok(Dataset {
        dtype: DType::Compound(fields),
        len: length,
        data,
    })
}

pub fn write_columns(
    node: &Node,
    key: &str,
    length: usize,
    columns: &[(String, Column)],
) -> Result<()> {
    let dataset = encode_columns(&join_path(node.path(), key), length, columns)?;
    node.write_dataset(key, dataset)?;
    Ok(())
}

/// Payload bytes of one length-prefixed text cell
fn text_cell(cell: &[u8]) -> Option<&[u8]> {
    let len = read_pod::<u32>(cell.get(..TEXT_PREFIX)?) as usize;
    cell.get(TEXT_PREFIX..TEXT_PREFIX.checked_add(len)?)
}

/// Unpack a compound dataset into its titled columns
pub fn read_columns(dataset: &Dataset, path: &str) -> Result<ColumnSet> {
    let DType::Compound(fields) = &dataset.dtype else {
        return Err(StoreError::corrupt(path, "expected a compound dataset"));
    };
    check_size(dataset, path)?;
    let row_width = dataset.dtype.row_width().unwrap_or(0);
    let mut columns = Vec::with_capacity(fields.len());
    let mut offset = 0;
    for field in fields {
        let width = field.ty.width();
        let cells = (0..dataset.len).map(|row| {
            let start = row * row_width + offset;
            &dataset.data[start..start + width]
        });
        let column = match field.ty {
            FieldType::Scalar(ScalarType::Bool) => {
                Column::Scalar(ArrayValue::Bool(cells.map(|c| c[0] != 0).collect()))
            }
            FieldType::Scalar(ScalarType::U8) => {
                Column::Scalar(ArrayValue::U8(cells.map(|c| c[0]).collect()))
            }
            FieldType::Scalar(ScalarType::I32) => {
                Column::Scalar(ArrayValue::I32(cells.map(read_pod).collect()))
            }
            FieldType::Scalar(ScalarType::I64) => {
                Column::Scalar(ArrayValue::I64(cells.map(read_pod).collect()))
            }
            FieldType::Scalar(ScalarType::F32) => {
                Column::Scalar(ArrayValue::F32(cells.map(read_pod).collect()))
            }
            FieldType::Scalar(ScalarType::F64) => {
                Column::Scalar(ArrayValue::F64(cells.map(read_pod).collect()))
            }
            FieldType::FixedStr(_) => {
                let mut values = Vec::with_capacity(dataset.len);
                for cell in cells {
                    let bytes = text_cell(cell).ok_or_else(|| {
                        StoreError::corrupt(
                            path,
                            format!("column '{}' holds a text cell longer than its width", field.name),
                        )
                    })?;
                    let text = std::str::from_utf8(bytes).map_err(|e| {
                        StoreError::corrupt(
                            path,
                            format!("column '{}' holds invalid utf-8: {}", field.name, e),
                        )
                    })?;
                    values.push(text.to_string());
                }
                Column::Text(values)
            }
        };
        columns.push((field.name.clone(), column));
        offset += width;
    }
    Ok(ColumnSet {
        path: path.to_string(),
        len: dataset.len,
        columns,
    })
}

/// Read the compound dataset at `key`; `Ok(None)` when nothing is stored there
pub fn read_columns_at(node: &Node, key: &str) -> Result<Option<ColumnSet>> {
    let child = node.child(key)?;
    match child.dataset()? {
        Some(dataset) => read_columns(&dataset, child.path()).map(Some),
        None => Ok(None),
    }
}

/// Store variable-length numeric rows as one flat array plus an index of
/// `(start_index, stop_index)` pairs.
pub fn write_ragged(node: &Node, key: &str, elem: ScalarType, rows: &[ArrayValue]) -> Result<()> {
    let mut flat = ArrayValue::empty(elem);
    let mut starts = Vec::with_capacity(rows.len());
    let mut stops = Vec::with_capacity(rows.len());
    for row in rows {
        starts.push(flat.len() as i64);
        flat.extend_from(row)?;
        stops.push(flat.len() as i64);
    }
    node.delete(key)?;
    let group = node.require_group(key)?;
    write_array(&group, RAGGED_DATA, &flat)?;
    write_columns(
        &group,
        RAGGED_INDEX,
        rows.len(),
        &[
            (START_INDEX.to_string(), Column::Scalar(ArrayValue::I64(starts))),
            (STOP_INDEX.to_string(), Column::Scalar(ArrayValue::I64(stops))),
        ],
    )
}

/// Invert [`write_ragged`]; `Ok(None)` when no ragged group exists at `key`
pub fn read_ragged(node: &Node, key: &str) -> Result<Option<Vec<ArrayValue>>> {
    let group = node.child(key)?;
    if !group.exists()? {
        return Ok(None);
    }
    let flat = read_array(&group, RAGGED_DATA)?
        .ok_or_else(|| StoreError::corrupt(group.path(), "ragged column lacks its data array"))?;
    let mut index = read_columns_at(&group, RAGGED_INDEX)?
        .ok_or_else(|| StoreError::corrupt(group.path(), "ragged column lacks its index"))?;
    let bounds = |column: Option<Column>, name: &str| match column {
        Some(Column::Scalar(ArrayValue::I64(values))) => Ok(values),
        _ => Err(StoreError::corrupt(
            group.path(),
            format!("ragged index column '{}' missing or mistyped", name),
        )),
    };
    let starts = bounds(index.take(START_INDEX), START_INDEX)?;
    let stops = bounds(index.take(STOP_INDEX), STOP_INDEX)?;

    let mut rows = Vec::with_capacity(starts.len());
    for (start, stop) in starts.into_iter().zip(stops) {
        if start < 0 || stop < start || stop as usize > flat.len() {
            return Err(StoreError::corrupt(
                group.path(),
                format!("index pair ({}, {}) outside data of length {}", start, stop, flat.len()),
            ));
        }
        rows.push(flat.slice(start as usize, stop as usize));
    }
    Ok(Some(rows))
}
