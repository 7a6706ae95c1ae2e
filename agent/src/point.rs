use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Tag value attached to a point. Core indices are numeric, everything else is text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Text(String),
    Index(u64),
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TagValue::Text(s) => f.write_str(s),
            TagValue::Index(i) => write!(f, "{i}"),
        }
    }
}

impl From<&str> for TagValue {
    fn from(s: &str) -> Self {
        TagValue::Text(s.to_string())
    }
}

impl From<String> for TagValue {
    fn from(s: String) -> Self {
        TagValue::Text(s)
    }
}

impl From<usize> for TagValue {
    fn from(i: usize) -> Self {
        TagValue::Index(i as u64)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Float(f64),
    Integer(i64),
}

impl FieldValue {
    pub fn as_f64(&self) -> f64 {
        match *self {
            FieldValue::Float(v) => v,
            FieldValue::Integer(v) => v as f64,
        }
    }
}

impl From<f64> for FieldValue {
    fn from(v: f64) -> Self {
        FieldValue::Float(v)
    }
}

impl From<f32> for FieldValue {
    fn from(v: f32) -> Self {
        FieldValue::Float(v as f64)
    }
}

impl From<u64> for FieldValue {
    fn from(v: u64) -> Self {
        FieldValue::Integer(i64::try_from(v).unwrap_or(i64::MAX))
    }
}

/// One measurement sample. The sink assigns the timestamp at write time.
///
/// Points are built through [`MetricPoint::new`], which always sets the `host` tag,
/// and are read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    measurement: String,
    tags: BTreeMap<String, TagValue>,
    fields: BTreeMap<String, FieldValue>,
}

impl MetricPoint {
    pub fn new(measurement: &str, host: &str) -> PointBuilder {
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), TagValue::from(host));
        PointBuilder {
            measurement: measurement.to_string(),
            tags,
            fields: BTreeMap::new(),
        }
    }

    pub fn measurement(&self) -> &str {
        &self.measurement
    }

    pub fn tags(&self) -> &BTreeMap<String, TagValue> {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn tag(&self, key: &str) -> Option<&TagValue> {
        self.tags.get(key)
    }

    /// Shorthand for the `value` field every measurement carries.
    pub fn value(&self) -> Option<f64> {
        self.fields.get("value").map(FieldValue::as_f64)
    }
}

#[derive(Debug)]
pub struct PointBuilder {
    measurement: String,
    tags: BTreeMap<String, TagValue>,
    fields: BTreeMap<String, FieldValue>,
}

impl PointBuilder {
    /// `host` is fixed by [`MetricPoint::new`] and cannot be replaced here.
    pub fn tag(mut self, key: &str, value: impl Into<TagValue>) -> Self {
        if key != "host" {
            self.tags.insert(key.to_string(), value.into());
        }
        self
    }

    pub fn field(mut self, key: &str, value: impl Into<FieldValue>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn value(self, value: impl Into<FieldValue>) -> MetricPoint {
        self.field("value", value).build()
    }

    pub fn build(self) -> MetricPoint {
        MetricPoint {
            measurement: self.measurement,
            tags: self.tags,
            fields: self.fields,
        }
    }
}

fn escape(out: &mut String, s: &str, special: &[char]) {
    for c in s.chars() {
        if special.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
}

/// Encodes a point as one InfluxDB line protocol line, without timestamp.
///
/// Non-finite float fields are dropped; returns `None` when no field survives.
pub fn to_line(point: &MetricPoint) -> Option<String> {
    const KEY: &[char] = &[',', '=', ' '];
    let mut line = String::with_capacity(96);
    escape(&mut line, &point.measurement, &[',', ' ']);
    for (k, v) in &point.tags {
        let v = v.to_string();
        if v.is_empty() {
            continue;
        }
        line.push(',');
        escape(&mut line, k, KEY);
        line.push('=');
        escape(&mut line, &v, KEY);
    }
    let mut sep = ' ';
    for (k, v) in &point.fields {
        let rendered = match *v {
            FieldValue::Float(f) if f.is_finite() => format!("{f}"),
            FieldValue::Float(_) => continue,
            FieldValue::Integer(i) => format!("{i}i"),
        };
        line.push(sep);
        escape(&mut line, k, KEY);
        line.push('=');
        line.push_str(&rendered);
        sep = ',';
    }
    if sep == ' ' {
        return None;
    }
    Some(line)
}

/// Encodes a batch, one line per point. Points without encodable fields are skipped.
pub fn encode_batch(points: &[MetricPoint]) -> String {
    let mut body = String::new();
    for p in points {
        if let Some(line) = to_line(p) {
            body.push_str(&line);
            body.push('\n');
        }
    }
    body
}
