//! Integration tests for in-place append.

use trx_core::{
    AppendOptions, Backend, DType, GroupPolicy, IDENTITY_AFFINE, NdArray, TrxError, TrxFile,
    TrxOptions,
};

fn random_container(rng: &mut fastrand::Rng, streamlines: usize) -> TrxFile {
    let mut trx = TrxFile::create(Backend::memory(), TrxOptions::default()).unwrap();
    let lengths: Vec<u64> = (0..streamlines).map(|_| rng.u64(1..6)).collect();
    let total: u64 = lengths.iter().sum();
    let points: Vec<[f32; 3]> = (0..total)
        .map(|_| [rng.f32(), rng.f32(), rng.f32()])
        .collect();
    trx.push_streamlines(&NdArray::from_rows(&points), &lengths)
        .unwrap();
    let fa: Vec<f32> = (0..total).map(|_| rng.f32()).collect();
    trx.set_data_per_point("fa", &NdArray::from_slice(&fa)).unwrap();
    let ids: Vec<i32> = (0..streamlines).map(|_| rng.i32(..)).collect();
    trx.set_data_per_streamline("id", &NdArray::from_slice(&ids))
        .unwrap();
    trx
}

fn snapshot(trx: &TrxFile) -> (Vec<u8>, Vec<u64>, Vec<u8>, Vec<u8>, u64, u64) {
    (
        trx.streamlines().unwrap().data().as_bytes().to_vec(),
        trx.offset_index().unwrap().offsets().to_vec(),
        trx.data_per_point().unwrap()["fa"].data().as_bytes().to_vec(),
        trx.data_per_streamline().unwrap()["id"].as_bytes().to_vec(),
        trx.nb_streamlines().unwrap(),
        trx.nb_points().unwrap(),
    )
}

#[test]
fn append_is_associative() {
    let mut rng = fastrand::Rng::with_seed(0x7472);
    let mut a = random_container(&mut rng, 4);
    let mut b = random_container(&mut rng, 3);
    let mut c = random_container(&mut rng, 5);

    let mut left = a.deepcopy().unwrap();
    left.append(&b, AppendOptions::default()).unwrap();
    left.append(&c, AppendOptions::default()).unwrap();

    let mut bc = b.deepcopy().unwrap();
    bc.append(&c, AppendOptions::default()).unwrap();
    let mut right = a.deepcopy().unwrap();
    right.append(&bc, AppendOptions::default()).unwrap();

    assert_eq!(snapshot(&left), snapshot(&right));
    assert_eq!(left.nb_streamlines().unwrap(), 12);
    let index = left.offset_index().unwrap();
    assert_eq!(
        index.offsets().last().copied().unwrap() + index.lengths().last().copied().unwrap(),
        left.nb_points().unwrap()
    );

    for trx in [&mut a, &mut b, &mut c, &mut left, &mut right, &mut bc] {
        trx.close().unwrap();
    }
}

#[test]
fn concatenate_matches_sequential_append() {
    let mut rng = fastrand::Rng::with_seed(11);
    let mut a = random_container(&mut rng, 2);
    let mut b = random_container(&mut rng, 3);
    let mut merged = trx_core::concatenate(&[&a, &b]).unwrap();
    let mut manual = a.deepcopy().unwrap();
    manual.append(&b, AppendOptions::default()).unwrap();
    assert_eq!(snapshot(&merged), snapshot(&manual));
    for trx in [&mut a, &mut b, &mut merged, &mut manual] {
        trx.close().unwrap();
    }
}

fn double_precision_container(lengths: &[u64]) -> TrxFile {
    let options = TrxOptions::builder().positions_dtype(DType::Float64).build();
    let mut trx = TrxFile::create(Backend::memory(), options).unwrap();
    let total: u64 = lengths.iter().sum();
    let points: Vec<[f64; 3]> = (0..total).map(|i| [i as f64 + 0.5, 1.0, -2.0]).collect();
    trx.push_streamlines(&NdArray::from_rows(&points), lengths)
        .unwrap();
    let fa: Vec<f64> = (0..total).map(|i| i as f64 / 4.0).collect();
    trx.set_data_per_point("fa", &NdArray::from_slice(&fa)).unwrap();
    trx
}

#[test]
fn blank_single_precision_target_takes_double_precision_rows() {
    let mut target = TrxFile::create(Backend::memory(), TrxOptions::default()).unwrap();
    let mut source = double_precision_container(&[2, 1]);

    target.append(&source, AppendOptions::default()).unwrap();
    assert_eq!(target.nb_streamlines().unwrap(), 2);
    assert_eq!(target.nb_points().unwrap(), 3);
    let positions = target.streamlines().unwrap();
    assert_eq!(positions.data().dtype(), DType::Float32);
    assert_eq!(
        positions.data().to_vec::<f32>().unwrap(),
        vec![0.5, 1.0, -2.0, 1.5, 1.0, -2.0, 2.5, 1.0, -2.0]
    );
    assert_eq!(target.offset_index().unwrap().offsets(), &[0, 2]);
    target.close().unwrap();
    source.close().unwrap();
}

#[test]
fn concatenate_casts_to_the_first_input_dtypes() {
    let mut single = TrxFile::create(Backend::memory(), TrxOptions::default()).unwrap();
    single
        .push_streamlines(&NdArray::from_rows(&[[9.0f32, 9.0, 9.0]; 3]), &[3])
        .unwrap();
    single
        .set_data_per_point("fa", &NdArray::from_slice(&[1.0f32, 1.0, 1.0]))
        .unwrap();
    let mut double = double_precision_container(&[1, 3]);

    let mut merged = trx_core::concatenate(&[&single, &double]).unwrap();
    assert_eq!(merged.nb_streamlines().unwrap(), 3);
    assert_eq!(merged.nb_points().unwrap(), 7);
    assert_eq!(merged.streamlines().unwrap().data().dtype(), DType::Float32);
    let per_point = merged.data_per_point().unwrap();
    let fa = per_point["fa"].data();
    assert_eq!(fa.dtype(), DType::Float32);
    assert_eq!(
        fa.to_vec::<f32>().unwrap(),
        vec![1.0, 1.0, 1.0, 0.0, 0.25, 0.5, 0.75]
    );
    for trx in [&mut single, &mut double, &mut merged] {
        trx.close().unwrap();
    }
}

#[test]
fn mismatched_space_fails_without_mutation() {
    let mut rng = fastrand::Rng::with_seed(3);
    let mut target = random_container(&mut rng, 2);
    let mut source = random_container(&mut rng, 2);
    let mut shifted = IDENTITY_AFFINE;
    shifted[0][3] = 0.5;
    source.set_affine(shifted).unwrap();

    let before = snapshot(&target);
    assert!(matches!(
        target.append(&source, AppendOptions::default()),
        Err(TrxError::SchemaMismatch { .. })
    ));
    assert_eq!(snapshot(&target), before);

    source.set_affine(IDENTITY_AFFINE).unwrap();
    source.set_dimensions([2, 2, 2]).unwrap();
    assert!(matches!(
        target.append(&source, AppendOptions::default()),
        Err(TrxError::SchemaMismatch { .. })
    ));
    target.close().unwrap();
    source.close().unwrap();
}

#[test]
fn tiny_affine_differences_are_tolerated() {
    let mut rng = fastrand::Rng::with_seed(5);
    let mut target = random_container(&mut rng, 1);
    let mut source = random_container(&mut rng, 1);
    let mut nudged = IDENTITY_AFFINE;
    nudged[2][2] = 1.000_000_1;
    source.set_affine(nudged).unwrap();
    target.append(&source, AppendOptions::default()).unwrap();
    assert_eq!(target.nb_streamlines().unwrap(), 2);
    target.close().unwrap();
    source.close().unwrap();
}

#[test]
fn key_sets_must_match_when_both_hold_data() {
    let mut rng = fastrand::Rng::with_seed(9);
    let mut target = random_container(&mut rng, 2);
    let mut source = random_container(&mut rng, 2);
    // Strip every named array; positions remain, so the source is still non-empty.
    source.prune_metadata(true).unwrap();

    match target.append(&source, AppendOptions::default()) {
        Err(TrxError::KeySetMismatch { collection, ours, theirs }) => {
            assert_eq!(collection, "data_per_point");
            assert_eq!(ours, vec!["fa"]);
            assert!(theirs.is_empty());
        }
        other => panic!("expected KeySetMismatch, got {other:?}"),
    }
    assert_eq!(target.nb_streamlines().unwrap(), 2);
    target.close().unwrap();
    source.close().unwrap();
}

#[test]
fn conflicting_policy_is_rejected() {
    let mut rng = fastrand::Rng::with_seed(1);
    let mut target = random_container(&mut rng, 1);
    let mut source = random_container(&mut rng, 1);
    let both = AppendOptions::builder()
        .delete_per_group(true)
        .keep_first_per_group(true)
        .build();
    assert!(matches!(
        target.append(&source, both),
        Err(TrxError::ConflictingPolicy)
    ));
    target.close().unwrap();
    source.close().unwrap();
}

#[test]
fn keep_first_extends_matching_per_group_arrays() {
    let mut rng = fastrand::Rng::with_seed(21);
    let mut target = random_container(&mut rng, 2);
    target.set_group("bundle", &[0, 1]).unwrap();
    target
        .set_data_per_group("bundle", "mean", &NdArray::from_slice(&[1.0f32]))
        .unwrap();
    let mut source = random_container(&mut rng, 2);
    source.set_group("bundle", &[1]).unwrap();
    source
        .set_data_per_group("bundle", "mean", &NdArray::from_slice(&[2.0f32]))
        .unwrap();

    target
        .append(&source, GroupPolicy::KeepFirstPerGroup.into())
        .unwrap();
    assert_eq!(target.groups().unwrap()["bundle"], vec![0, 1, 3]);
    assert_eq!(
        target.data_per_group().unwrap()["bundle"]["mean"]
            .to_vec::<f32>()
            .unwrap(),
        vec![1.0, 2.0]
    );
    target.close().unwrap();
    source.close().unwrap();
}

#[test]
fn archives_cannot_grow() {
    let dir = tempfile::tempdir().expect("tmp");
    let path = dir.path().join("bundle.trx");
    let mut rng = fastrand::Rng::with_seed(2);
    let mut original = random_container(&mut rng, 2);
    original.save(&path).unwrap();

    let mut archived = TrxFile::load(&path).unwrap();
    match archived.append(&original, AppendOptions::default()) {
        Err(TrxError::ImmutableBackend { kind }) => {
            assert_eq!(kind, trx_core::BackendKind::Archive);
        }
        other => panic!("expected ImmutableBackend, got {other:?}"),
    }
    assert_eq!(archived.nb_streamlines().unwrap(), 2);

    // The documented way out: grow a copy instead.
    let mut copy = archived.deepcopy().unwrap();
    copy.append(&original, AppendOptions::default()).unwrap();
    assert_eq!(copy.nb_streamlines().unwrap(), 4);

    for trx in [&mut archived, &mut original, &mut copy] {
        trx.close().unwrap();
    }
}
