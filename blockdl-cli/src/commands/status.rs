//! Status command - inspect the breakpoints of an interrupted download.

use std::path::Path;

use blockdl::{BlockRange, BreakpointStore};

use crate::error::CliError;

/// Run the status command.
pub fn run(output: &Path) -> Result<(), CliError> {
    let store_path = BreakpointStore::path_for(output);
    let store = BreakpointStore::open(&store_path)?
        .ok_or_else(|| CliError::NoBreakpoints(output.display().to_string()))?;

    for line in render(&store) {
        println!("{}", line);
    }
    Ok(())
}

fn render(store: &BreakpointStore) -> Vec<String> {
    let total = store.total_length();
    let remaining = store.remaining_bytes();
    let mut lines = vec![
        format!("URL:    {}", store.url()),
        format!(
            "Size:   {} bytes ({} remaining, {}%)",
            total,
            remaining,
            blockdl::block::compute_percent(total, total.saturating_sub(remaining))
        ),
    ];

    for record in store.records() {
        let range = BlockRange::from_checkpoint(&record);
        lines.push(format!(
            "  block {:>3}: {:>3}%  offset {}  remaining {}",
            range.block_index,
            range.percent(),
            range.start_offset,
            range.remaining
        ));
    }
    lines
}
