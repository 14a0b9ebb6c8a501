pub use crate::fit::{fit, fit_with_callback, FitOptions};
pub use crate::model::{
    CompartmentConstraint, Dataset, DatasetDescriptor, GaussianIrf, InitialConcentration, Irf,
    KMatrix, MeasuredIrf, Megacomplex, Model,
};
pub use crate::parameter::{Parameter, ParameterGroup};
pub use crate::result::FitResult;
