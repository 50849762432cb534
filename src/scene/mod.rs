//! Demo world generation: a template with the model path filled in.

use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::Result;

const MODEL_PATH_PLACEHOLDER: &str = "{{model_path}}";

/// Writes `output` from `template`, pointing it at `<asset_name>/model.sdf`.
pub fn write_demo_world(template: &Path, output: &Path, asset_name: &str) -> Result<()> {
    let template_text = fs::read_to_string(template)?;
    let world = template_text.replace(MODEL_PATH_PLACEHOLDER, &format!("{}/model.sdf", asset_name));

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, world)?;

    info!("Wrote demo world {}", output.display());
    Ok(())
}
