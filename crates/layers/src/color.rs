use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::record::AttrValue;

pub type Rgba = [u8; 4];

pub const DEFAULT_PALETTE: [Rgba; 8] = [
    [31, 119, 180, 255],
    [255, 127, 14, 255],
    [44, 160, 44, 255],
    [214, 39, 40, 255],
    [148, 103, 189, 255],
    [140, 86, 75, 255],
    [227, 119, 194, 255],
    [127, 127, 127, 255],
];

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMethod {
    /// One color per distinct value.
    Unique,
    /// One color per numeric bin of `bin_width`.
    Bins,
}

/// Attribute-driven coloring, persisted under `colorModel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorModel {
    pub attribute: String,
    pub method: ColorMethod,
    #[serde(default = "default_bin_width")]
    pub bin_width: f64,
    /// Color overrides by bucket label.
    #[serde(default)]
    pub manual: BTreeMap<String, Rgba>,
    #[serde(default = "default_palette")]
    pub palette: Vec<Rgba>,
}

fn default_bin_width() -> f64 {
    10.0
}

fn default_palette() -> Vec<Rgba> {
    DEFAULT_PALETTE.to_vec()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum Bucket {
    Bin(i64),
    Value(String),
}

/// Bucket-to-color assignment computed over a record set.
///
/// Ordering contract:
/// - Palette colors are assigned in bucket order (bins ascending, unique
///   values lexicographically), so the same values always get the same
///   colors.
#[derive(Debug, Clone, PartialEq)]
pub struct Legend {
    model: ColorModel,
    colors: BTreeMap<Bucket, Rgba>,
}

impl ColorModel {
    pub fn unique(attribute: &str) -> Self {
        Self {
            attribute: attribute.to_string(),
            method: ColorMethod::Unique,
            bin_width: default_bin_width(),
            manual: BTreeMap::new(),
            palette: default_palette(),
        }
    }

    pub fn bins(attribute: &str, bin_width: f64) -> Self {
        Self {
            method: ColorMethod::Bins,
            bin_width,
            ..Self::unique(attribute)
        }
    }

    fn bucket(&self, value: Option<&AttrValue>) -> Option<Bucket> {
        match (self.method, value?) {
            (_, AttrValue::Null) => None,
            (ColorMethod::Unique, v) => Some(Bucket::Value(v.to_string())),
            (ColorMethod::Bins, AttrValue::Number(v)) => {
                if !(v.is_finite() && self.bin_width > 0.0) {
                    return None;
                }
                Some(Bucket::Bin((v / self.bin_width).floor() as i64))
            }
            (ColorMethod::Bins, _) => None,
        }
    }

    fn label(&self, bucket: &Bucket) -> String {
        match bucket {
            Bucket::Bin(i) => {
                let lo = *i as f64 * self.bin_width;
                format!("{lo} to {}", lo + self.bin_width)
            }
            Bucket::Value(v) => v.clone(),
        }
    }

    /// Builds the legend for the values of `attribute` across a record set.
    pub fn legend<'a>(&self, values: impl IntoIterator<Item = Option<&'a AttrValue>>) -> Legend {
        let mut buckets: Vec<Bucket> = values.into_iter().filter_map(|v| self.bucket(v)).collect();
        buckets.sort();
        buckets.dedup();

        let colors = buckets
            .into_iter()
            .enumerate()
            .filter_map(|(i, b)| {
                let color = match self.manual.get(&self.label(&b)) {
                    Some(c) => *c,
                    None if self.palette.is_empty() => return None,
                    None => self.palette[i % self.palette.len()],
                };
                Some((b, color))
            })
            .collect();

        Legend {
            model: self.clone(),
            colors,
        }
    }
}

impl Legend {
    pub fn color(&self, value: Option<&AttrValue>) -> Option<Rgba> {
        let bucket = self.model.bucket(value)?;
        self.colors.get(&bucket).copied()
    }

    /// `(label, color)` pairs in bucket order.
    pub fn entries(&self) -> Vec<(String, Rgba)> {
        self.colors
            .iter()
            .map(|(b, c)| (self.model.label(b), *c))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }
}
