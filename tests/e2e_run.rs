//! End-to-end runs of the batch pipeline over real files on disk.

use std::path::Path;

use image::RgbaImage;
use pb_pipeline::batcher::RunOutcome;
use pb_pipeline::{Command, CommandList};
use pixelbatch::config::Config;
use pixelbatch::runner;

fn write_png(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let img = RgbaImage::from_pixel(4, 4, image::Rgba([120, 130, 140, 255]));
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();
    if ext == "jpg" || ext == "jpeg" {
        // JPEG cannot encode an alpha channel; drop it for these fixtures.
        image::DynamicImage::ImageRgba8(img)
            .to_rgb8()
            .save(path)
            .unwrap();
    } else {
        img.save(path).unwrap();
    }
}

fn base_config(output: &Path) -> Config {
    let mut config = Config::default();
    config.batch.output_directory = output.to_path_buf();
    config
}

#[test]
fn preview_names_match_the_files_a_full_run_writes() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    write_png(&input.join("sunset.png"));
    write_png(&input.join("portrait.png"));

    let mut config = base_config(&output);
    config.batch.name_pattern = "shot[001]".into();

    let preview = runner::run_batch(&config, &input, true).unwrap();
    assert_eq!(preview.outcome, RunOutcome::Completed);
    let predicted: Vec<String> = preview
        .predicted
        .iter()
        .map(|(_, path)| path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(predicted, ["shot001.png", "shot002.png"]);
    // A preview writes nothing.
    assert!(!output.exists());

    let full = runner::run_batch(&config, &input, false).unwrap();
    assert_eq!(full.outcome, RunOutcome::Completed);
    assert!(full.failed_actions.is_empty());

    for name in &predicted {
        let path = output.join(name);
        assert!(path.exists(), "missing {}", path.display());
        assert!(image::open(&path).is_ok());
    }
}

#[test]
fn rerunning_with_rename_new_keeps_both_generations() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    write_png(&input.join("photo.png"));

    let config = base_config(&output);

    let first = runner::run_batch(&config, &input, false).unwrap();
    assert_eq!(first.outcome, RunOutcome::Completed);
    assert!(output.join("photo.png").exists());

    // The default overwrite mode renames the new file.
    let second = runner::run_batch(&config, &input, false).unwrap();
    assert_eq!(second.outcome, RunOutcome::Completed);
    assert!(output.join("photo.png").exists());
    assert!(output.join("photo (1).png").exists());
}

#[test]
fn conditions_restrict_which_files_are_exported() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    write_png(&input.join("keep.png"));
    write_png(&input.join("drop.jpg"));

    let mut config = base_config(&output);
    config.conditions = CommandList::from(vec![Command::builtin("matching_file_extension")]);

    let summary = runner::run_batch(&config, &input, false).unwrap();

    assert_eq!(summary.matched_count, 1);
    assert!(output.join("keep.png").exists());
    assert!(!output.join("drop.png").exists());
}

#[test]
fn folder_structure_is_kept_or_flattened_per_config() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    write_png(&input.join("top.png"));
    write_png(&input.join("album/inner.png"));

    // Mirroring the input folder structure under the output directory.
    let structured_output = dir.path().join("structured");
    let mut config = base_config(&structured_output);
    config.batch.use_folder_structure = true;

    let summary = runner::run_batch(&config, &input, false).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert!(structured_output.join("album/inner.png").exists());
    assert!(structured_output.join("top.png").exists());

    // The flattening action removes the folders before export.
    let flat_output = dir.path().join("flat");
    let mut config = base_config(&flat_output);
    config.batch.use_folder_structure = true;
    config.actions = CommandList::from(vec![
        Command::builtin("remove_folder_structure").enabled_for_previews()
    ]);

    let summary = runner::run_batch(&config, &input, false).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert!(flat_output.join("inner.png").exists());
    assert!(flat_output.join("top.png").exists());
    assert!(!flat_output.join("album").exists());
}

#[test]
fn unreadable_input_fails_unless_configured_to_continue() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("input");
    let output = dir.path().join("output");
    write_png(&input.join("good.png"));
    std::fs::write(input.join("broken.png"), b"not an image").unwrap();

    let config = base_config(&output);
    let summary = runner::run_batch(&config, &input, false).unwrap();
    assert!(matches!(summary.outcome, RunOutcome::Failed { .. }));

    let mut config = base_config(&output);
    config.batch.continue_on_error = true;
    let summary = runner::run_batch(&config, &input, false).unwrap();
    assert_eq!(summary.outcome, RunOutcome::Completed);
    assert!(output.join("good.png").exists());
}
