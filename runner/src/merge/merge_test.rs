use super::{MergeEngine, MergeError};
use crate::{
    bundle::{self, meta::MetaFile, Format},
    logger::{Analyzer, AnalyzerSettings, LogInfo, Logger, Trigger},
    problem::{MetaData, OptimizationType, ProblemType},
};
use std::{collections::BTreeMap, fs, path::Path};

const EVALUATIONS: usize = 3;

fn sphere(instance: u32, dimension: usize) -> MetaData {
    MetaData {
        problem_id: 1,
        instance,
        name: "Sphere".into(),
        n_variables: dimension,
        optimization_type: OptimizationType::Minimization,
        problem_type: ProblemType::Real,
    }
}

/// write a bundle with one run per (instance, dimension) pair
fn write_bundle(path: &Path, format: Format, runs: &[(u32, usize)]) {
    let mut logger = Analyzer::new(AnalyzerSettings {
        root: path.to_path_buf(),
        format,
        algorithm_name: "test".into(),
        algorithm_info: String::new(),
        triggers: vec![Trigger::Always],
        properties: vec![],
        store_positions: false,
    })
    .unwrap();

    for (instance, dimension) in runs {
        logger.attach_problem(&sphere(*instance, *dimension));
        for evaluation in 1..=EVALUATIONS {
            logger.log(&LogInfo {
                evaluations: evaluation,
                raw_y: 1.0 / evaluation as f64,
                y: 1.0 / evaluation as f64,
                best_y: 1.0 / evaluation as f64,
                has_improved: true,
                violation: 0.0,
                penalty: 0.0,
                x: &[],
            });
        }
        logger.reset();
    }
    logger.close().unwrap();
}

fn temp(root: &Path, index: usize) -> std::path::PathBuf {
    bundle::temp_bundle(root, "out", index)
}

/// (runs per dimension, data lines per dimension) of a merged bundle
fn summary(bundle: &Path, format: Format) -> (BTreeMap<usize, usize>, BTreeMap<usize, usize>) {
    let meta = MetaFile::load(&bundle.join(format!(
        "IOHprofiler_f1_Sphere.{}",
        format.extension()
    )))
    .unwrap();

    let lines = fs::read_dir(bundle.join("data_f1_Sphere"))
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            let dimension = path
                .file_stem()
                .unwrap()
                .to_str()
                .unwrap()
                .rsplit("DIM")
                .next()
                .unwrap()
                .parse()
                .unwrap();
            (dimension, fs::read_to_string(path).unwrap().lines().count())
        })
        .collect();

    (meta.runs_per_dimension(), lines)
}

#[test]
pub fn merges_all_temporary_bundles() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(&temp(dir.path(), 1), Format::Legacy, &[(1, 5)]);
    write_bundle(&temp(dir.path(), 2), Format::Legacy, &[(2, 5), (2, 10)]);
    write_bundle(&temp(dir.path(), 3), Format::Legacy, &[(3, 5)]);

    let engine = MergeEngine::new(dir.path(), "out");
    let merged = engine.merge(false).unwrap();

    assert_eq!(merged, Some(dir.path().join("out")));
    assert!(engine.temp_bundles().unwrap().is_empty());

    let (runs, lines) = summary(&dir.path().join("out"), Format::Legacy);
    assert_eq!(runs, BTreeMap::from([(5, 3), (10, 1)]));
    // a header per run plus the evaluations
    assert_eq!(
        lines,
        BTreeMap::from([(5, 3 * (EVALUATIONS + 1)), (10, EVALUATIONS + 1)])
    );
}

#[test]
pub fn merge_is_associative() {
    let bundles: [&[(u32, usize)]; 3] = [&[(1, 5)], &[(2, 5), (2, 10)], &[(3, 10)]];
    let format = Format::Structured;

    // all at once
    let all = tempfile::tempdir().unwrap();
    for (index, runs) in bundles.iter().enumerate() {
        write_bundle(&temp(all.path(), index + 1), format, runs);
    }
    MergeEngine::new(all.path(), "out").merge(true).unwrap();

    // (B, C) first, then A
    let grouped = tempfile::tempdir().unwrap();
    let engine = MergeEngine::new(grouped.path(), "out");
    write_bundle(&temp(grouped.path(), 1), format, bundles[1]);
    write_bundle(&temp(grouped.path(), 2), format, bundles[2]);
    engine.merge(true).unwrap();
    write_bundle(&temp(grouped.path(), 1), format, bundles[0]);
    let merged = engine.merge(true).unwrap();

    assert_eq!(merged, Some(grouped.path().join("out")));
    assert!(!grouped.path().join("out-1").exists());
    assert_eq!(
        summary(&all.path().join("out"), format),
        summary(&grouped.path().join("out"), format)
    );
}

#[test]
pub fn mixed_formats_leave_bundles_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(&temp(dir.path(), 1), Format::Legacy, &[(1, 5)]);
    write_bundle(&temp(dir.path(), 2), Format::Structured, &[(2, 5)]);

    let engine = MergeEngine::new(dir.path(), "out");
    let result = engine.merge(true);

    assert!(matches!(
        result,
        Err(MergeError::IncompatibleFormats { ref stem, .. }) if stem == "IOHprofiler_f1_Sphere"
    ));
    assert!(temp(dir.path(), 1).join("IOHprofiler_f1_Sphere.info").is_file());
    assert!(temp(dir.path(), 2).join("IOHprofiler_f1_Sphere.json").is_file());
    assert!(!dir.path().join("out").exists());
}

#[test]
pub fn unreadable_meta_data_leaves_bundles_untouched() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(&temp(dir.path(), 1), Format::Structured, &[(1, 5)]);
    write_bundle(&temp(dir.path(), 2), Format::Structured, &[(2, 5)]);
    let broken = temp(dir.path(), 2).join("IOHprofiler_f1_Sphere.json");
    fs::write(&broken, "{\"version\": ").unwrap();

    let result = MergeEngine::new(dir.path(), "out").merge(true);

    assert!(matches!(result, Err(MergeError::Meta { ref path, .. }) if *path == broken));
    assert!(temp(dir.path(), 1).join("IOHprofiler_f1_Sphere.json").is_file());
    assert!(broken.is_file());
    assert!(!dir.path().join("out").exists());
}

#[test]
pub fn mixed_formats_with_existing_target_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(&dir.path().join("out"), Format::Structured, &[(1, 5)]);
    write_bundle(&temp(dir.path(), 1), Format::Legacy, &[(1, 5)]);

    assert!(MergeEngine::new(dir.path(), "out").merge(true).is_err());
    assert!(temp(dir.path(), 1).is_dir());
}

#[test]
pub fn remerge_is_a_noop() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(&temp(dir.path(), 1), Format::Legacy, &[(1, 5)]);
    write_bundle(&temp(dir.path(), 2), Format::Legacy, &[(2, 5)]);

    let engine = MergeEngine::new(dir.path(), "out");
    engine.merge(true).unwrap();
    let before = summary(&dir.path().join("out"), Format::Legacy);
    let info = fs::read_to_string(dir.path().join("out/IOHprofiler_f1_Sphere.info")).unwrap();

    assert_eq!(engine.merge(true).unwrap(), Some(dir.path().join("out")));
    assert_eq!(summary(&dir.path().join("out"), Format::Legacy), before);
    assert_eq!(
        fs::read_to_string(dir.path().join("out/IOHprofiler_f1_Sphere.info")).unwrap(),
        info
    );
}

#[test]
pub fn nothing_to_merge() {
    let dir = tempfile::tempdir().unwrap();

    assert_eq!(MergeEngine::new(dir.path(), "out").merge(true).unwrap(), None);
    assert_eq!(
        MergeEngine::new(&dir.path().join("missing"), "out")
            .merge(false)
            .unwrap(),
        None
    );
}

#[test]
pub fn existing_target_is_kept_without_consolidation() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(&dir.path().join("out"), Format::Legacy, &[(1, 5)]);
    write_bundle(&temp(dir.path(), 1), Format::Legacy, &[(2, 5)]);

    let merged = MergeEngine::new(dir.path(), "out").merge(false).unwrap();

    assert_eq!(merged, Some(dir.path().join("out-1")));
    assert_eq!(summary(&dir.path().join("out"), Format::Legacy).0, BTreeMap::from([(5, 1)]));
    assert_eq!(summary(&dir.path().join("out-1"), Format::Legacy).0, BTreeMap::from([(5, 1)]));
}

#[test]
pub fn unrelated_folders_are_ignored() {
    let dir = tempfile::tempdir().unwrap();
    write_bundle(&temp(dir.path(), 1), Format::Legacy, &[(1, 5)]);
    write_bundle(&dir.path().join("other-tmp-2"), Format::Legacy, &[(2, 5)]);
    write_bundle(&dir.path().join("out-old"), Format::Legacy, &[(3, 5)]);

    MergeEngine::new(dir.path(), "out").merge(true).unwrap();

    assert!(dir.path().join("other-tmp-2").is_dir());
    assert!(dir.path().join("out-old").is_dir());
    assert_eq!(summary(&dir.path().join("out"), Format::Legacy).0, BTreeMap::from([(5, 1)]));
}
