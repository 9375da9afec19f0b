use csv::{ReaderBuilder, StringRecord, Trim};
use log::{debug, info};
use ndarray::Array2;

use super::Dataset;
use crate::{Result, VisErr};

/// Uploads above this size are refused before parsing.
pub const MAX_FILE_SIZE: usize = 5 * 1024 * 1024;

/// The output of the ingestion boundary: encoded matrices plus the statistics used
/// to normalize them.
#[derive(Debug, Clone)]
pub struct Ingested {
    pub features: Array2<f32>,
    pub labels: Array2<f32>,
    pub feature_count: usize,
    pub class_count: usize,
    pub feature_means: Vec<f32>,
    pub feature_stds: Vec<f32>,
    pub feature_names: Vec<String>,
    pub class_names: Vec<String>,
}

enum Column {
    Numeric { values: Vec<f32>, mean: f32, std: f32 },
    Categorical { values: Vec<usize>, levels: Vec<String> },
}

/// Turns raw comma separated text into encoded feature and label matrices.
///
/// The first line is the header, the last column is the label. Numeric feature
/// columns are z-score normalized, other feature columns and the label are
/// one-hot encoded in order of first appearance.
///
/// # Arguments
/// * `name` - The file name, used to check the format.
/// * `text` - The raw file contents.
///
/// # Errors
/// `SizeLimitExceeded`, `UnsupportedFormat` or `EmptyOrMalformed`.
pub fn ingest(name: &str, text: &str) -> Result<Ingested> {
    if text.len() > MAX_FILE_SIZE {
        return Err(VisErr::SizeLimitExceeded {
            size: text.len(),
            limit: MAX_FILE_SIZE,
        });
    }

    if !name.to_lowercase().ends_with(".csv") {
        return Err(VisErr::UnsupportedFormat(name.to_string()));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let header: Vec<String> = reader
        .headers()
        .map_err(malformed)?
        .iter()
        .map(str::to_string)
        .collect();

    if header.len() < 2 {
        return Err(VisErr::EmptyOrMalformed(
            "at least one feature column and a label column are required".into(),
        ));
    }

    let rows = reader
        .records()
        .collect::<std::result::Result<Vec<StringRecord>, _>>()
        .map_err(malformed)?;

    if rows.is_empty() {
        return Err(VisErr::EmptyOrMalformed("the file has no data rows".into()));
    }

    let label_col = header.len() - 1;
    let columns: Vec<Column> = (0..label_col)
        .map(|c| encode_column(rows.iter().map(|r| &r[c])))
        .collect();

    let mut feature_names = Vec::new();
    let mut feature_means = Vec::new();
    let mut feature_stds = Vec::new();
    for (column, name) in columns.iter().zip(&header) {
        match column {
            Column::Numeric { mean, std, .. } => {
                feature_names.push(name.to_string());
                feature_means.push(*mean);
                feature_stds.push(*std);
            }
            Column::Categorical { levels, .. } => {
                for level in levels {
                    feature_names.push(format!("{name}={level}"));
                    feature_means.push(0.);
                    feature_stds.push(1.);
                }
            }
        }
    }

    let feature_count = feature_names.len();
    let mut features = Array2::zeros((rows.len(), feature_count));
    for (r, mut row) in features.rows_mut().into_iter().enumerate() {
        let mut c = 0;
        for column in &columns {
            match column {
                Column::Numeric { values, mean, std } => {
                    let scale = if *std > 0. { *std } else { 1. };
                    row[c] = (values[r] - mean) / scale;
                    c += 1;
                }
                Column::Categorical { values, levels } => {
                    row[c + values[r]] = 1.;
                    c += levels.len();
                }
            }
        }
    }

    let (label_idx, class_names) = levels(rows.iter().map(|r| &r[label_col]));
    let class_count = class_names.len();
    let mut labels = Array2::zeros((rows.len(), class_count));
    for (r, &class) in label_idx.iter().enumerate() {
        labels[[r, class]] = 1.;
    }

    debug!(
        "ingested {} rows: {feature_count} encoded features, {class_count} classes",
        rows.len()
    );

    Ok(Ingested {
        features,
        labels,
        feature_count,
        class_count,
        feature_means,
        feature_stds,
        feature_names,
        class_names,
    })
}

/// Ingests a CSV file straight into a [`Dataset`].
///
/// # Errors
/// The errors of [`ingest`].
pub fn load_csv(name: &str, text: &str) -> Result<Dataset> {
    let ingested = ingest(name, text)?;
    let dataset = Dataset::new(name, ingested.features, ingested.labels)?
        .with_names(ingested.feature_names, ingested.class_names)
        .with_stats(ingested.feature_means, ingested.feature_stds);

    info!("loaded dataset '{name}': {}", dataset.summary());
    Ok(dataset)
}

/// Reports unequal row lengths and undecodable text as a malformed file.
fn malformed(e: csv::Error) -> VisErr {
    VisErr::EmptyOrMalformed(e.to_string())
}

fn encode_column<'a, I>(fields: I) -> Column
where
    I: Iterator<Item = &'a str> + Clone,
{
    let numeric: Option<Vec<f32>> = fields
        .clone()
        .map(|f| f.parse::<f32>().ok().filter(|v| v.is_finite()))
        .collect();

    match numeric {
        Some(values) => {
            let n = values.len() as f32;
            let mean = values.iter().sum::<f32>() / n;
            let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
            Column::Numeric {
                values,
                mean,
                std: var.sqrt(),
            }
        }
        None => {
            let (values, levels) = levels(fields);
            Column::Categorical { values, levels }
        }
    }
}

/// Maps each value to the index of its level, levels in order of first appearance.
fn levels<'a, I>(fields: I) -> (Vec<usize>, Vec<String>)
where
    I: Iterator<Item = &'a str>,
{
    let mut levels: Vec<String> = Vec::new();
    let indices = fields
        .map(|f| match levels.iter().position(|l| l == f) {
            Some(i) => i,
            None => {
                levels.push(f.to_string());
                levels.len() - 1
            }
        })
        .collect();

    (indices, levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    const IRIS_LIKE: &str = "\
sepal,petal,species
1.0,10.0,setosa
2.0,10.0,versicolor
3.0,10.0,setosa
";

    #[test]
    fn numeric_features_are_normalized() {
        let ing = ingest("iris.csv", IRIS_LIKE).unwrap();

        assert_eq!(ing.feature_count, 2);
        assert_eq!(ing.class_count, 2);
        assert_eq!(ing.class_names, vec!["setosa", "versicolor"]);
        assert!((ing.feature_means[0] - 2.).abs() < 1e-6);
        assert!((ing.feature_stds[0] - (2f32 / 3.).sqrt()).abs() < 1e-6);

        // zero variance column is only centered
        assert_eq!(ing.feature_stds[1], 0.);
        assert!(ing.features.column(1).iter().all(|&v| v == 0.));

        let col = ing.features.column(0);
        assert!((col.sum()).abs() < 1e-5);
        assert_eq!(ing.labels.row(1).to_vec(), vec![0., 1.]);
    }

    #[test]
    fn categorical_features_are_one_hot() {
        let text = "color,size,label\nred,1,a\nblue,2,b\nred,3,a\n";
        let ing = ingest("shapes.CSV", text).unwrap();

        assert_eq!(ing.feature_count, 3);
        assert_eq!(ing.feature_names, vec!["color=red", "color=blue", "size"]);
        assert_eq!(ing.features.row(1).slice(ndarray::s![..2]).to_vec(), vec![0., 1.]);
    }

    #[test]
    fn boundary_errors() {
        assert!(matches!(
            ingest("data.json", IRIS_LIKE),
            Err(VisErr::UnsupportedFormat(_))
        ));
        assert!(matches!(ingest("a.csv", ""), Err(VisErr::EmptyOrMalformed(_))));
        assert!(matches!(
            ingest("a.csv", "x,y\n"),
            Err(VisErr::EmptyOrMalformed(_))
        ));
        assert!(matches!(
            ingest("a.csv", "x,y\n1,2,3\n"),
            Err(VisErr::EmptyOrMalformed(_))
        ));

        let huge = "a".repeat(MAX_FILE_SIZE + 1);
        assert!(matches!(
            ingest("big.csv", &huge),
            Err(VisErr::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn quoted_fields_keep_their_commas() {
        let text = "name,x,label\r\n\"Smith, J\",1,a\r\n\"Doe, K\",2,b\r\n";
        let ing = ingest("people.csv", text).unwrap();

        assert_eq!(ing.features.nrows(), 2);
        assert_eq!(ing.feature_names, vec!["name=Smith, J", "name=Doe, K", "x"]);
        assert_eq!(ing.class_names, vec!["a", "b"]);
    }

    #[test]
    fn load_csv_builds_a_dataset() {
        let ds = load_csv("iris.csv", IRIS_LIKE).unwrap();
        assert_eq!(ds.input_shape(), [2]);
        assert_eq!(ds.output_shape(), [2]);
        assert_eq!(ds.feature_names(), ["sepal", "petal"]);
    }
}
