use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::NamedTempFile;

use video_annotator::config::AnnotatorConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "ANNOTATOR_CONFIG",
        "ANNOTATOR_CONFIDENCE",
        "ANNOTATOR_IOU",
        "ANNOTATOR_BATCH_SIZE",
        "ANNOTATOR_MODEL_PATH",
        "ANNOTATOR_BACKENDS",
        "ANNOTATOR_MAX_INPUT_BYTES",
        "ANNOTATOR_COMPRESS_ABOVE_BYTES",
        "ANNOTATOR_TARGET_BITRATE",
        "ANNOTATOR_FFMPEG",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_toml_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    file.write_all(
        br#"
        [detector]
        confidence_threshold = 0.4
        batch_size = 8
        backends = ["tract", "stub"]
        model_path = "models/yolo.onnx"
        class_names = ["person", "bicycle", "car"]

        [limits]
        max_input_bytes = 1000
        target_bitrate = "2M"

        [output]
        video_codec = "libx264"
        "#,
    )
    .expect("write config");

    std::env::set_var("ANNOTATOR_CONFIG", file.path());
    std::env::set_var("ANNOTATOR_IOU", "0.45");
    std::env::set_var("ANNOTATOR_BACKENDS", "stub");
    std::env::set_var("ANNOTATOR_COMPRESS_ABOVE_BYTES", "off");

    let cfg = AnnotatorConfig::load().expect("load config");

    assert_eq!(cfg.detector.confidence_threshold, 0.4);
    assert_eq!(cfg.detector.iou_threshold, 0.45);
    assert_eq!(cfg.detector.batch_size, 8);
    assert_eq!(cfg.detector.backends, vec!["stub".to_string()]);
    assert_eq!(
        cfg.detector.model_path,
        Some(PathBuf::from("models/yolo.onnx"))
    );
    assert_eq!(cfg.detector.class_label(2), "car");
    assert_eq!(cfg.limits.max_input_bytes, 1000);
    assert_eq!(cfg.limits.target_bitrate, "2M");
    assert_eq!(cfg.limits.compress_above_bytes, None);
    assert_eq!(cfg.output.video_codec, "libx264");
    assert_eq!(cfg.output.ffmpeg_path, "ffmpeg");

    clear_env();
}

#[test]
fn loads_json_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    file.write_all(
        br#"{
            "detector": { "iou_threshold": 0.6, "input_width": 320, "input_height": 320 },
            "limits": { "compress_above_bytes": 2048 }
        }"#,
    )
    .expect("write config");
    std::env::set_var("ANNOTATOR_CONFIG", file.path());
    std::env::set_var("ANNOTATOR_FFMPEG", "/opt/ffmpeg/bin/ffmpeg");

    let cfg = AnnotatorConfig::load().expect("load config");
    assert_eq!(cfg.detector.iou_threshold, 0.6);
    assert_eq!(cfg.detector.confidence_threshold, 0.32);
    assert_eq!(cfg.detector.input_spec().width, 320);
    assert_eq!(cfg.limits.compress_above_bytes, Some(2048));
    assert_eq!(cfg.output.ffmpeg_path, "/opt/ffmpeg/bin/ffmpeg");

    clear_env();
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = AnnotatorConfig::load().expect("load config");
    assert_eq!(cfg.detector.batch_size, 16);
    assert_eq!(cfg.limits.compress_above_bytes, Some(50 * 1024 * 1024));
}

#[test]
fn rejects_invalid_env_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("ANNOTATOR_BATCH_SIZE", "0");
    assert!(AnnotatorConfig::load().is_err());

    std::env::set_var("ANNOTATOR_BATCH_SIZE", "many");
    assert!(AnnotatorConfig::load().is_err());

    clear_env();
    std::env::set_var("ANNOTATOR_CONFIDENCE", "1.2");
    assert!(AnnotatorConfig::load().is_err());

    clear_env();
}
