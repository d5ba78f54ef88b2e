//! Record types shared by the integration suites.

use chrono::{DateTime, TimeDelta, Utc};
use nodestash::registry;
use nodestash::{ArrayValue, Record, RecordSchema, RecordValue, Result, StoreError, TypeDescriptor, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub position: f64,
    pub intensity: f64,
    pub label: String,
}

impl Peak {
    pub fn new(position: f64, intensity: f64, label: &str) -> Self {
        Self {
            position,
            intensity,
            label: label.to_string(),
        }
    }
}

impl Record for Peak {
    const KIND: &'static str = "IntegrationPeak";

    fn schema() -> RecordSchema {
        RecordSchema::new(Self::KIND)
            .field("position", TypeDescriptor::Float)
            .field("intensity", TypeDescriptor::Float)
            .field("label", TypeDescriptor::Str)
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::new(Self::KIND)
            .with("position", self.position)
            .with("intensity", self.intensity)
            .with("label", self.label.as_str())
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        Ok(Self {
            position: record.take("position")?,
            intensity: record.take("intensity")?,
            label: record.take("label")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub name: String,
    pub acquired: DateTime<Utc>,
    pub exposure: TimeDelta,
    pub intensities: Vec<f64>,
    pub peaks: Vec<Peak>,
    pub traces: Vec<Vec<f64>>,
    pub note: Option<String>,
}

impl Spectrum {
    pub fn sample(name: &str, peaks: usize) -> Self {
        let acquired = DateTime::from_timestamp(1_700_000_000, 250_000_000).unwrap_or_default();
        Self {
            name: name.to_string(),
            acquired,
            exposure: TimeDelta::milliseconds(1500),
            intensities: (0..16).map(|i| i as f64 * 0.5).collect(),
            peaks: (0..peaks)
                .map(|i| Peak::new(100.0 + i as f64, 10.0 * i as f64, &format!("p{}", i)))
                .collect(),
            traces: vec![vec![1.0, 2.0], vec![]],
            note: None,
        }
    }
}

fn decode_list(value: Value, field: &str) -> Result<Vec<Value>> {
    match value {
        Value::List(items) => Ok(items),
        Value::Absent => Ok(Vec::new()),
        other => Err(StoreError::schema(
            format!("<{}>", Spectrum::KIND),
            format!("field '{}' is {}", field, other.type_name()),
        )),
    }
}

impl Record for Spectrum {
    const KIND: &'static str = "IntegrationSpectrum";

    fn schema() -> RecordSchema {
        RecordSchema::new(Self::KIND)
            .field("name", TypeDescriptor::Str)
            .field("acquired", TypeDescriptor::DateTime)
            .field("exposure", TypeDescriptor::Duration)
            .field("intensities", TypeDescriptor::Array(nodestash::ScalarType::F64))
            .field("peaks", TypeDescriptor::list(Peak::descriptor()))
            .field(
                "traces",
                TypeDescriptor::list(TypeDescriptor::Array(nodestash::ScalarType::F64)),
            )
            .field("note", TypeDescriptor::optional(TypeDescriptor::Str))
    }

    fn register_dependencies() -> Result<()> {
        registry::register::<Peak>()
    }

    fn to_record(&self) -> RecordValue {
        RecordValue::new(Self::KIND)
            .with("name", self.name.as_str())
            .with("acquired", self.acquired)
            .with("exposure", self.exposure)
            .with("intensities", self.intensities.clone())
            .with(
                "peaks",
                Value::List(self.peaks.iter().map(|p| Value::Record(p.to_record())).collect()),
            )
            .with(
                "traces",
                Value::List(
                    self.traces
                        .iter()
                        .map(|t| Value::Array(ArrayValue::F64(t.clone())))
                        .collect(),
                ),
            )
            .with("note", self.note.clone())
    }

    fn from_record(mut record: RecordValue) -> Result<Self> {
        let peaks = decode_list(record.take("peaks")?, "peaks")?
            .into_iter()
            .map(|item| match item {
                Value::Record(peak) => Peak::from_record(peak),
                other => Err(StoreError::schema(
                    format!("<{}>", Self::KIND),
                    format!("peak is {}", other.type_name()),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        let traces = decode_list(record.take("traces")?, "traces")?
            .into_iter()
            .map(|item| match item {
                Value::Array(ArrayValue::F64(values)) => Ok(values),
                other => Err(StoreError::schema(
                    format!("<{}>", Self::KIND),
                    format!("trace is {}", other.type_name()),
                )),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            name: record.take("name")?,
            acquired: record.take("acquired")?,
            exposure: record.take("exposure")?,
            intensities: record.take("intensities")?,
            peaks,
            traces,
            note: record.take("note")?,
        })
    }
}
