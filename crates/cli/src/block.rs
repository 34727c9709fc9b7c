//! `zeroer block`: candidate generation with a dataset's blocking rule.

use std::path::PathBuf;

use zeroer_core::block::{Blocker, BlockerRegistry, Table};
use zeroer_core::ZeroerConfig;

use crate::util::{read_file, source_name, write_file};
use crate::CliError;

pub fn cmd_block(
    config_path: PathBuf,
    dataset_id: String,
    left_path: PathBuf,
    right_path: Option<PathBuf>,
    self_join: bool,
    output: Option<PathBuf>,
) -> Result<(), CliError> {
    let right_path = match (self_join, right_path) {
        (true, Some(right)) if right != left_path => {
            return Err(CliError::usage(format!(
                "--self-join blocks {} against itself; drop the right table argument ({})",
                left_path.display(),
                right.display()
            )));
        }
        (true, _) => None,
        (false, Some(right)) => Some(right),
        (false, None) => {
            return Err(CliError::usage("a right table is required unless --self-join is set"));
        }
    };

    let config = ZeroerConfig::from_toml(&read_file(&config_path)?)?;
    let registry = BlockerRegistry::from_rules(&config.blocking);
    let blocker = registry.get(&dataset_id)?;

    let left = Table::from_csv(&source_name(&left_path), &read_file(&left_path)?)?;
    let pairs = match right_path {
        None => blocker.block_self(&left),
        Some(ref path) => {
            let right = Table::from_csv(&source_name(path), &read_file(path)?)?;
            blocker.block(&left, &right)
        }
    };

    let mut wtr = csv::Writer::from_writer(Vec::new());
    let write = |wtr: &mut csv::Writer<Vec<u8>>| -> Result<(), csv::Error> {
        wtr.write_record(["ltable_id", "rtable_id"])?;
        for p in &pairs {
            wtr.write_record([p.left_id.as_str(), p.right_id.as_str()])?;
        }
        wtr.flush()?;
        Ok(())
    };
    write(&mut wtr).map_err(|e| CliError::io(format!("cannot write pairs: {e}")))?;
    let buf = wtr
        .into_inner()
        .map_err(|e| CliError::io(format!("cannot write pairs: {e}")))?;

    match output {
        Some(ref path) => {
            write_file(path, &buf)?;
            eprintln!("wrote {}", path.display());
        }
        None => print!("{}", String::from_utf8_lossy(&buf)),
    }

    eprintln!("{dataset_id}: {} candidate pairs", pairs.len());
    Ok(())
}
