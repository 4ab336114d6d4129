//! Python bindings.

use crate::{apply_patch_str, ArchNormalizer, Normalized};
use archdiff_core::NormalizeConfig;
use pyo3::prelude::*;

#[pyclass(name = "Normalized")]
pub struct PyNormalized {
    inner: Normalized,
}

#[pymethods]
impl PyNormalized {
    fn to_xml(&self) -> PyResult<String> {
        Ok(self.inner.to_xml()?)
    }

    fn target_xml(&self) -> PyResult<String> {
        Ok(self.inner.target_xml()?)
    }

    fn to_json(&self) -> PyResult<String> {
        Ok(self.inner.patch.to_json()?)
    }

    fn __len__(&self) -> usize {
        self.inner.patch.len()
    }
}

fn normalizer(config_json: Option<&str>) -> PyResult<ArchNormalizer> {
    let config = match config_json {
        Some(json) => NormalizeConfig::from_json(json)?,
        None => NormalizeConfig::shared().clone(),
    };
    Ok(ArchNormalizer::new(config))
}

/// Patch turning `old_arch` into `new_arch`, as `<data>` xml.
#[pyfunction]
#[pyo3(signature = (old_arch, new_arch, config_json=None))]
fn normalize_arch(old_arch: &str, new_arch: &str, config_json: Option<&str>) -> PyResult<String> {
    Ok(normalizer(config_json)?.compile(old_arch, new_arch)?.to_xml()?)
}

#[pyfunction]
#[pyo3(signature = (old_arch, new_arch, config_json=None))]
fn compile_arch(
    old_arch: &str,
    new_arch: &str,
    config_json: Option<&str>,
) -> PyResult<PyNormalized> {
    let inner = normalizer(config_json)?.compile(old_arch, new_arch)?;
    Ok(PyNormalized { inner })
}

#[pyfunction]
fn apply_arch_patch(arch: &str, patch: &str) -> PyResult<String> {
    Ok(apply_patch_str(arch, patch)?)
}

#[pymodule]
fn archdiff(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<PyNormalized>()?;
    m.add_function(wrap_pyfunction!(normalize_arch, m)?)?;
    m.add_function(wrap_pyfunction!(compile_arch, m)?)?;
    m.add_function(wrap_pyfunction!(apply_arch_patch, m)?)?;
    Ok(())
}
