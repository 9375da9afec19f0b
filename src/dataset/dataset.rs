use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::{Result, VisErr};

/// An immutable snapshot of loaded training data.
///
/// Replaced wholesale when a new file is loaded, never mutated.
#[derive(Debug, Clone)]
pub struct Dataset {
    name: String,
    features: Array2<f32>,
    labels: Array2<f32>,
    feature_names: Vec<String>,
    class_names: Vec<String>,
    feature_means: Vec<f32>,
    feature_stds: Vec<f32>,
}

impl Dataset {
    /// Creates a new `Dataset`.
    ///
    /// # Arguments
    /// * `name` - A display name, usually the file name.
    /// * `features` - The feature matrix, one row per sample.
    /// * `labels` - The label matrix, one row per sample.
    ///
    /// # Returns
    /// The dataset, or an error if it's empty or the row counts disagree.
    pub fn new(name: impl Into<String>, features: Array2<f32>, labels: Array2<f32>) -> Result<Self> {
        if features.nrows() != labels.nrows() {
            return Err(VisErr::ShapeMismatch {
                what: "dataset rows",
                got: labels.nrows(),
                expected: features.nrows(),
            });
        }

        if features.nrows() == 0 || features.ncols() == 0 || labels.ncols() == 0 {
            return Err(VisErr::EmptyOrMalformed(
                "the dataset must have at least one sample, feature and class".into(),
            ));
        }

        let feature_names = (0..features.ncols()).map(|i| format!("x{i}")).collect();
        let class_names = (0..labels.ncols()).map(|i| format!("y{i}")).collect();

        Ok(Self {
            name: name.into(),
            feature_means: vec![0.; features.ncols()],
            feature_stds: vec![1.; features.ncols()],
            features,
            labels,
            feature_names,
            class_names,
        })
    }

    /// Attaches column names to the dataset.
    pub fn with_names(mut self, feature_names: Vec<String>, class_names: Vec<String>) -> Self {
        if feature_names.len() == self.feature_count() {
            self.feature_names = feature_names;
        }
        if class_names.len() == self.class_count() {
            self.class_names = class_names;
        }
        self
    }

    /// Attaches the normalization statistics the features were scaled with.
    pub fn with_stats(mut self, means: Vec<f32>, stds: Vec<f32>) -> Self {
        if means.len() == self.feature_count() && stds.len() == self.feature_count() {
            self.feature_means = means;
            self.feature_stds = stds;
        }
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn features(&self) -> ArrayView2<'_, f32> {
        self.features.view()
    }

    pub fn labels(&self) -> ArrayView2<'_, f32> {
        self.labels.view()
    }

    pub fn sample_count(&self) -> usize {
        self.features.nrows()
    }

    pub fn feature_count(&self) -> usize {
        self.features.ncols()
    }

    pub fn class_count(&self) -> usize {
        self.labels.ncols()
    }

    pub fn input_shape(&self) -> [usize; 1] {
        [self.feature_count()]
    }

    pub fn output_shape(&self) -> [usize; 1] {
        [self.class_count()]
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    pub fn feature_means(&self) -> &[f32] {
        &self.feature_means
    }

    pub fn feature_stds(&self) -> &[f32] {
        &self.feature_stds
    }

    /// Returns the feature row of a sample, if it exists.
    pub fn sample(&self, index: usize) -> Option<ArrayView1<'_, f32>> {
        (index < self.sample_count()).then(|| self.features.row(index))
    }

    /// Returns a short human readable description, e.g. `"150 samples, 4 features"`.
    pub fn summary(&self) -> String {
        format!(
            "{} samples, {} features, {} classes",
            self.sample_count(),
            self.feature_count(),
            self.class_count()
        )
    }
}
