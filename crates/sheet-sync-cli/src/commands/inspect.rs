use std::path::Path;

use crate::commands::common::{field_to_list_item, format_field_lines, read_sheet, FieldListItem};
use crate::error::CliError;

pub fn run_inspect(sheet_path: &Path, as_json: bool) -> Result<(), CliError> {
    let document = read_sheet(sheet_path)?;

    if as_json {
        let json_items = document
            .fields()
            .map(|(path, field)| field_to_list_item(path, field))
            .collect::<Vec<FieldListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    println!(
        "{} (level {} {}), version {}",
        document.character_name, document.level, document.character_class, document.version
    );
    for line in format_field_lines(&document) {
        println!("{line}");
    }
    Ok(())
}
