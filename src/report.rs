//! Console tables for the one-shot `--list` and `--rename` modes

use console::style;
use prettytable::{format, Cell, Row, Table};
use std::path::Path;

use crate::gallery::{ImageInfo, RenameReport};
use crate::utils::format_bytes;

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_format(*format::consts::FORMAT_BOX_CHARS);
    table.set_titles(Row::new(header.iter().map(|h| Cell::new(h)).collect()));
    table
}

/// One row per image: name, size, extension, sniffed format, used flag
pub fn image_table(images: &[ImageInfo]) -> Table {
    let mut table = new_table(&["Name", "Size", "Ext", "Format", "Used"]);

    for image in images {
        let detected = if image.browser_maybe_unsupported {
            format!("{} (!)", image.detected_format)
        } else {
            image.detected_format.to_string()
        };
        table.add_row(Row::new(vec![
            Cell::new(&image.name),
            Cell::new(&format_bytes(image.size)),
            Cell::new(&image.ext),
            Cell::new(&detected),
            Cell::new(if image.used { "yes" } else { "" }),
        ]));
    }

    table
}

/// One row per planned or performed rename
pub fn rename_table(report: &RenameReport) -> Table {
    let mut table = new_table(&["From", "To"]);
    for entry in &report.renamed {
        table.add_row(Row::new(vec![Cell::new(&entry.from), Cell::new(&entry.to)]));
    }
    table
}

pub fn print_image_list(folder: &Path, images: &[ImageInfo]) {
    let used = images.iter().filter(|i| i.used).count();
    println!(
        "\n{} {} ({} images, {} used)\n",
        style("Folder:").bold(),
        folder.display(),
        images.len(),
        used
    );

    if images.is_empty() {
        println!("{}", style("No images found").yellow());
        return;
    }
    image_table(images).printstd();

    let unsupported = images.iter().filter(|i| i.browser_maybe_unsupported).count();
    if unsupported > 0 {
        println!(
            "\n{} {} HEIC/HEIF file(s) marked (!) will not preview in most browsers",
            style("Note:").yellow().bold(),
            unsupported
        );
    }
}

pub fn print_rename_report(report: &RenameReport) {
    let title = if report.dry_run {
        style("RENAME PLAN (dry run)").cyan().bold()
    } else {
        style("RENAMED").green().bold()
    };
    println!(
        "\n{}  highest existing number: {}, {} to rename, {} already numbered\n",
        title,
        report.max_num,
        report.renamed.len(),
        report.skipped.len()
    );

    if report.renamed.is_empty() {
        println!("{}", style("Nothing to rename").dim());
        return;
    }
    rename_table(report).printstd();
}
