use crate::parameter::{ParameterError, ParameterGroup};
use nalgebra::{DMatrix, DVector};

/// An instrument response function descriptor.
///
/// The matrix builder convolves the kinetic decay curves with this
/// response: analytically for [`GaussianIrf`], by discrete convolution for
/// [`MeasuredIrf`].
#[derive(Debug, Clone, PartialEq)]
pub enum Irf {
    /// a (multi-) Gaussian response described by parameters
    Gaussian(GaussianIrf),
    /// a measured response curve
    Measured(MeasuredIrf),
}

/// A Gaussian instrument response, possibly a weighted sum of several
/// Gaussians, with optional spectral dispersion of center and width, an
/// optional backsweep correction and optional coherent artifact
/// compartments.
///
/// All numeric fields hold parameter labels which are resolved against the
/// current parameter snapshot by [`GaussianIrf::evaluate`].
#[derive(Debug, Clone, PartialEq)]
pub struct GaussianIrf {
    /// center parameter labels, one per Gaussian
    pub center: Vec<String>,
    /// width parameter labels, one per Gaussian
    pub width: Vec<String>,
    /// scale parameter labels, one per Gaussian; empty means unit scales
    pub scale: Vec<String>,
    /// polynomial center dispersion coefficients over the estimated axis
    pub center_dispersion: Vec<String>,
    /// polynomial width dispersion coefficients over the estimated axis
    pub width_dispersion: Vec<String>,
    /// expansion point of the dispersion polynomials on the estimated axis
    pub dispersion_center: f64,
    /// backsweep period parameter label; `Some` enables the periodic
    /// folding correction
    pub backsweep_period: Option<String>,
    /// number of coherent artifact compartments (Gaussian derivative
    /// columns) to add, `0` disables the artifact
    pub coherent_artifact_order: usize,
}

impl GaussianIrf {
    /// create a single-Gaussian irf with the given center and width
    /// parameter labels and no dispersion, backsweep or coherent artifact
    pub fn new(center: &str, width: &str) -> Self {
        Self {
            center: vec![center.to_owned()],
            width: vec![width.to_owned()],
            scale: Vec::new(),
            center_dispersion: Vec::new(),
            width_dispersion: Vec::new(),
            dispersion_center: 0.0,
            backsweep_period: None,
            coherent_artifact_order: 0,
        }
    }

    /// Resolve this irf against a parameter snapshot at the given position
    /// `index` on the estimated axis.
    ///
    /// Dispersion shifts centers and widths by polynomials in
    /// `$(\lambda - \lambda_c)/100$`, mirroring the usual parametrization
    /// in target analysis.
    ///
    /// # Errors
    /// Fails if any referenced parameter label is unknown.
    pub fn evaluate(
        &self,
        parameters: &ParameterGroup,
        index: f64,
    ) -> Result<EvaluatedGaussianIrf, ParameterError> {
        let mut centers = self
            .center
            .iter()
            .map(|label| parameters.value(label))
            .collect::<Result<Vec<_>, _>>()?;
        let mut widths = self
            .width
            .iter()
            .map(|label| parameters.value(label))
            .collect::<Result<Vec<_>, _>>()?;

        let dist = (index - self.dispersion_center) / 100.0;
        for (i, label) in self.center_dispersion.iter().enumerate() {
            let coefficient = parameters.value(label)?;
            for center in centers.iter_mut() {
                *center += coefficient * dist.powi(i as i32 + 1);
            }
        }
        for (i, label) in self.width_dispersion.iter().enumerate() {
            let coefficient = parameters.value(label)?;
            for width in widths.iter_mut() {
                *width += coefficient * dist.powi(i as i32 + 1);
            }
        }

        let scales = if self.scale.is_empty() {
            vec![1.0; centers.len()]
        } else {
            self.scale
                .iter()
                .map(|label| parameters.value(label))
                .collect::<Result<Vec<_>, _>>()?
        };

        let backsweep_period = self
            .backsweep_period
            .as_ref()
            .map(|label| parameters.value(label))
            .transpose()?;

        Ok(EvaluatedGaussianIrf {
            centers,
            widths,
            scales,
            backsweep_period,
        })
    }
}

/// A Gaussian irf with all parameter labels resolved to values for one
/// position on the estimated axis.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatedGaussianIrf {
    /// centers of the Gaussians on the calculated axis
    pub centers: Vec<f64>,
    /// standard deviations of the Gaussians
    pub widths: Vec<f64>,
    /// relative scales of the Gaussians
    pub scales: Vec<f64>,
    /// the backsweep period, if backsweep is enabled
    pub backsweep_period: Option<f64>,
}

/// A measured instrument response.
#[derive(Debug, Clone, PartialEq)]
pub enum MeasuredIrf {
    /// one response curve over the calculated axis, shared by all positions
    /// on the estimated axis
    Curve(DVector<f64>),
    /// one response curve per position of the given estimated axis; the
    /// matrix builder picks the row whose axis value is nearest to the
    /// current group value
    PerIndex {
        /// the estimated axis the rows of `data` belong to
        axis: DVector<f64>,
        /// one response curve per row
        data: DMatrix<f64>,
    },
}

impl MeasuredIrf {
    /// the response curve to use at the given estimated axis value
    pub fn curve_at(&self, index: f64) -> DVector<f64> {
        match self {
            MeasuredIrf::Curve(curve) => curve.clone(),
            MeasuredIrf::PerIndex { axis, data } => {
                let nearest = axis
                    .iter()
                    .enumerate()
                    .min_by(|(_, a), (_, b)| {
                        (*a - index).abs().total_cmp(&(*b - index).abs())
                    })
                    .map(|(i, _)| i)
                    .unwrap_or(0);
                data.row(nearest).transpose()
            }
        }
    }
}
