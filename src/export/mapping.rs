use anyhow::{anyhow, Context, Result};
use std::{collections::HashMap, fs::File, path::Path};
use tracing::debug;

/// Load a clean-name -> label mapping from `file[:column]`.
///
/// The file is a CSV with a header row whose second column holds the clean
/// names, as written by `dump-headers`. `column` names the header of the
/// column to use as label; without it the second column itself is used.
pub fn read_mapping(arg: &str) -> Result<HashMap<String, String>> {
    let (file, column) = match arg.rsplit_once(':') {
        Some((file, column)) if !file.is_empty() && !column.is_empty() => (file, Some(column)),
        _ => (arg, None),
    };
    let path = Path::new(file);
    let handle = File::open(path).with_context(|| format!("opening mapping file {}", file))?;
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(handle);

    let label_idx = match column {
        Some(column) => {
            let headers = rdr
                .headers()
                .with_context(|| format!("reading header of {}", file))?;
            headers
                .iter()
                .position(|h| h == column)
                .ok_or_else(|| anyhow!("column {:?} not found in {}", column, file))?
        }
        None => 1,
    };

    let mut mapping = HashMap::new();
    for (i, row) in rdr.records().enumerate() {
        let row = row.with_context(|| format!("parsing line {} of {}", i + 2, file))?;
        let (Some(clean), Some(label)) = (row.get(1), row.get(label_idx)) else {
            continue;
        };
        mapping.insert(clean.to_string(), label.to_string());
    }
    debug!(file, entries = mapping.len(), "loaded name mapping");
    Ok(mapping)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn mapping_uses_named_column() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("headers.csv");
        fs::write(
            &path,
            "original_name,clean_name,label\nTitel,titel,Title\nJaar,jaar,Year\n",
        )?;

        let mapping = read_mapping(&format!("{}:label", path.display()))?;
        assert_eq!(mapping.get("titel").map(String::as_str), Some("Title"));
        assert_eq!(mapping.get("jaar").map(String::as_str), Some("Year"));

        let identity = read_mapping(&path.display().to_string())?;
        assert_eq!(identity.get("titel").map(String::as_str), Some("titel"));
        Ok(())
    }

    #[test]
    fn unknown_column_is_an_error() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("headers.csv");
        fs::write(&path, "original_name,clean_name\nTitel,titel\n")?;
        let err = read_mapping(&format!("{}:label", path.display())).unwrap_err();
        assert!(err.to_string().contains("not found"));
        Ok(())
    }
}
