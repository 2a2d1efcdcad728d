//! Summary statistics of table columns

use crate::Result;
use arrow::{
    array::{Array, ArrayRef, AsArray},
    compute::cast,
    datatypes::{DataType, Float64Type},
    record_batch::RecordBatch,
};
use rayon::prelude::*;
use std::{
    collections::HashMap,
    fmt::{self, Display},
};

/// Names of the statistics of numeric columns, in display order
const NUMERIC_STATS: [&str; 8] = ["count", "mean", "std", "min", "25%", "50%", "75%", "max"];

/// Names of the statistics of string columns, in display order
const STRING_STATS: [&str; 4] = ["count", "unique", "top", "freq"];

/// Statistics of a numeric column
#[derive(Clone, Debug, PartialEq)]
pub struct NumericStats {
    /// Number of values that are neither null nor NaN
    pub count: usize,
    pub mean: f64,
    /// Sample standard deviation
    pub std: f64,
    pub min: f64,
    /// 25%, 50% and 75% quantiles, linearly interpolated
    pub quartiles: [f64; 3],
    pub max: f64,
}
//
impl NumericStats {
    /// Compute the statistics of some values, ignoring NaNs
    pub fn new(values: impl IntoIterator<Item = f64>) -> Self {
        let mut values = values.into_iter().filter(|x| !x.is_nan()).collect::<Vec<_>>();
        values.sort_unstable_by(f64::total_cmp);
        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let std = if count > 1 {
            let square_deviations = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>();
            (square_deviations / (count - 1) as f64).sqrt()
        } else {
            f64::NAN
        };
        Self {
            count,
            mean,
            std,
            min: values.first().copied().unwrap_or(f64::NAN),
            quartiles: [0.25, 0.5, 0.75].map(|q| quantile(&values, q)),
            max: values.last().copied().unwrap_or(f64::NAN),
        }
    }

    /// Statistics in the order of [`NUMERIC_STATS`]
    fn cells(&self) -> [String; 8] {
        let [q1, q2, q3] = self.quartiles;
        [
            format_number(self.count as f64),
            format_number(self.mean),
            format_number(self.std),
            format_number(self.min),
            format_number(q1),
            format_number(q2),
            format_number(q3),
            format_number(self.max),
        ]
    }
}

/// Quantile of sorted values, linearly interpolated between closest ranks
pub fn quantile(sorted: &[f64], q: f64) -> f64 {
    let Some(last) = sorted.len().checked_sub(1) else {
        return f64::NAN;
    };
    let position = q * last as f64;
    let below = position.floor() as usize;
    let above = position.ceil() as usize;
    let weight = position - below as f64;
    sorted[below] + (sorted[above] - sorted[below]) * weight
}

/// Statistics of a string column
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StringStats {
    /// Number of non-null values
    pub count: usize,

    /// Number of distinct non-null values
    pub unique: usize,

    /// Most frequent value, the first one seen among equally frequent ones
    pub top: Option<String>,

    /// Number of occurences of the most frequent value
    pub freq: usize,
}
//
impl StringStats {
    /// Compute the statistics of some values
    pub fn new<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> Self {
        let mut counts = HashMap::<&str, (usize, usize)>::new();
        let mut count = 0;
        for value in values.into_iter().flatten() {
            let first_seen = counts.len();
            counts.entry(value).or_insert((0, first_seen)).0 += 1;
            count += 1;
        }
        let top = counts
            .iter()
            .max_by(|(_, (freq1, seen1)), (_, (freq2, seen2))| {
                freq1.cmp(freq2).then(seen2.cmp(seen1))
            });
        Self {
            count,
            unique: counts.len(),
            top: top.map(|(value, _)| (*value).to_owned()),
            freq: top.map_or(0, |(_, (freq, _))| *freq),
        }
    }

    /// Statistics in the order of [`STRING_STATS`]
    fn cells(&self) -> [String; 4] {
        [
            self.count.to_string(),
            self.unique.to_string(),
            self.top.clone().unwrap_or_else(|| "NaN".to_owned()),
            if self.count == 0 {
                "NaN".to_owned()
            } else {
                self.freq.to_string()
            },
        ]
    }
}

/// Statistics of the columns of a table
///
/// Numeric columns are described when there are some, otherwise string
/// columns are.
#[derive(Clone, Debug, PartialEq)]
pub enum Description {
    Numeric(Vec<(String, NumericStats)>),
    Strings(Vec<(String, StringStats)>),
    /// The table has neither numeric nor string columns
    Nothing,
}
//
impl Description {
    /// Describe the columns of a table
    pub fn new(batch: &RecordBatch) -> Result<Self> {
        let schema = batch.schema();
        let columns = schema
            .fields()
            .iter()
            .zip(batch.columns())
            .map(|(field, column)| (field.name().clone(), column.clone()))
            .collect::<Vec<_>>();

        // Numeric columns take precedence
        let numeric = columns
            .iter()
            .filter(|(_, column)| column.data_type().is_numeric())
            .collect::<Vec<_>>();
        if !numeric.is_empty() {
            let stats = numeric
                .into_par_iter()
                .map(|(name, column)| Ok((name.clone(), numeric_stats(column)?)))
                .collect::<Result<Vec<_>>>()?;
            return Ok(Self::Numeric(stats));
        }

        // Otherwise describe string columns
        let strings = columns
            .iter()
            .filter(|(_, column)| {
                matches!(column.data_type(), DataType::Utf8 | DataType::LargeUtf8)
            })
            .collect::<Vec<_>>();
        if strings.is_empty() {
            return Ok(Self::Nothing);
        }
        let stats = strings
            .into_par_iter()
            .map(|(name, column)| (name.clone(), string_stats(column)))
            .collect();
        Ok(Self::Strings(stats))
    }
}
//
impl Display for Description {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(columns) => write_table(
                f,
                &NUMERIC_STATS,
                columns.iter().map(|(name, stats)| (name.as_str(), stats.cells().to_vec())),
            ),
            Self::Strings(columns) => write_table(
                f,
                &STRING_STATS,
                columns.iter().map(|(name, stats)| (name.as_str(), stats.cells().to_vec())),
            ),
            Self::Nothing => write!(f, "No numeric or string column to describe"),
        }
    }
}

/// Compute the statistics of a numeric column
fn numeric_stats(column: &ArrayRef) -> Result<NumericStats> {
    let floats = cast(column, &DataType::Float64)?;
    Ok(NumericStats::new(floats.as_primitive::<Float64Type>().iter().flatten()))
}

/// Compute the statistics of a string column
fn string_stats(column: &ArrayRef) -> StringStats {
    match column.data_type() {
        DataType::LargeUtf8 => StringStats::new(column.as_string::<i64>().iter()),
        _ => StringStats::new(column.as_string::<i32>().iter()),
    }
}

/// Display a number with up to 6 decimals
fn format_number(x: f64) -> String {
    if x.is_nan() {
        return "NaN".to_owned();
    }
    let fixed = format!("{x:.6}");
    let trimmed = fixed.trim_end_matches('0');
    if trimmed.ends_with('.') {
        format!("{trimmed}0")
    } else {
        trimmed.to_owned()
    }
}

/// Write a right-aligned table with one row per statistic and one column per
/// table column
fn write_table<'a>(
    f: &mut fmt::Formatter<'_>,
    stat_names: &[&str],
    columns: impl Iterator<Item = (&'a str, Vec<String>)>,
) -> fmt::Result {
    let columns = columns.collect::<Vec<_>>();
    let label_width = stat_names.iter().map(|name| name.len()).max().unwrap_or(0);
    let widths = columns
        .iter()
        .map(|(name, cells)| {
            cells
                .iter()
                .map(|cell| cell.chars().count())
                .chain(std::iter::once(name.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect::<Vec<_>>();
    write!(f, "{:label_width$}", "")?;
    for ((name, _), width) in columns.iter().zip(&widths) {
        write!(f, "  {name:>width$}")?;
    }
    for (row, stat) in stat_names.iter().enumerate() {
        write!(f, "\n{stat:<label_width$}")?;
        for ((_, cells), width) in columns.iter().zip(&widths) {
            write!(f, "  {:>width$}", cells[row])?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::{
        array::{Float64Array, Int32Array, StringArray},
        datatypes::{Field, Schema},
    };
    use std::sync::Arc;

    #[test]
    fn quantiles_interpolate() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.25), 1.75);
        assert_eq!(quantile(&sorted, 0.5), 2.5);
        assert_eq!(quantile(&sorted, 0.75), 3.25);
        assert_eq!(quantile(&[7.0], 0.5), 7.0);
        assert!(quantile(&[], 0.5).is_nan());
    }

    #[test]
    fn numeric_statistics() {
        let stats = NumericStats::new([4.0, f64::NAN, 1.0, 3.0, 2.0]);
        assert_eq!(stats.count, 4);
        assert_eq!(stats.mean, 2.5);
        assert!((stats.std - 1.290_994_448_735_805_6).abs() < 1e-12);
        assert_eq!((stats.min, stats.max), (1.0, 4.0));
        assert_eq!(stats.quartiles, [1.75, 2.5, 3.25]);

        let single = NumericStats::new([5.0]);
        assert!(single.std.is_nan());
    }

    #[test]
    fn string_statistics() {
        let stats = StringStats::new([Some("b"), Some("a"), None, Some("a"), Some("b"), Some("c")]);
        assert_eq!(
            stats,
            StringStats {
                count: 5,
                unique: 3,
                top: Some("b".to_owned()),
                freq: 2,
            }
        );
        assert_eq!(StringStats::new([None]).cells(), ["0", "0", "NaN", "NaN"]);
    }

    #[test]
    fn numbers_are_compact() {
        assert_eq!(format_number(3.0), "3.0");
        assert_eq!(format_number(2.5), "2.5");
        assert_eq!(format_number(1.0 / 3.0), "0.333333");
        assert_eq!(format_number(f64::NAN), "NaN");
    }

    fn batch(columns: Vec<(&str, ArrayRef)>) -> RecordBatch {
        let schema = Schema::new(
            columns
                .iter()
                .map(|(name, column)| Field::new(*name, column.data_type().clone(), true))
                .collect::<Vec<_>>(),
        );
        RecordBatch::try_new(
            Arc::new(schema),
            columns.into_iter().map(|(_, column)| column).collect(),
        )
        .unwrap()
    }

    #[test]
    fn numeric_columns_take_precedence() {
        let table = batch(vec![
            ("text", Arc::new(StringArray::from(vec!["a", "b"])) as ArrayRef),
            ("score", Arc::new(Int32Array::from(vec![Some(1), None])) as ArrayRef),
            ("weight", Arc::new(Float64Array::from(vec![0.5, 1.5])) as ArrayRef),
        ]);
        let Description::Numeric(columns) = Description::new(&table).unwrap() else {
            panic!("numeric columns should be described");
        };
        let names = columns.iter().map(|(name, _)| name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["score", "weight"]);
        assert_eq!(columns[0].1.count, 1);
        assert_eq!(columns[1].1.mean, 1.0);

        let rendered = Description::new(&table).unwrap().to_string();
        let lines = rendered.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 1 + NUMERIC_STATS.len());
        assert_eq!(lines[0], "       score    weight");
        assert_eq!(lines[1], "count    1.0       2.0");
        assert_eq!(lines[3], "std      NaN  0.707107");
    }

    #[test]
    fn strings_are_described_otherwise() {
        let table = batch(vec![(
            "label",
            Arc::new(StringArray::from(vec!["x", "y", "x"])) as ArrayRef,
        )]);
        assert_eq!(
            Description::new(&table).unwrap().to_string(),
            "        label\n\
             count       3\n\
             unique      2\n\
             top         x\n\
             freq        2"
        );
    }
}
