//! Integration tests for backend binding, persistence and release.

use tempfile::tempdir;
use trx_core::{
    AppendOptions, Backend, BackendKind, DType, NdArray, OffsetIndex, Origin, RaggedArray, Space,
    SpaceAttributes, Tractogram, TrxError, TrxFile, TrxOptions,
};

fn sample(backend: Backend) -> TrxFile {
    let options = TrxOptions::builder()
        .point_chunk_rows(4)
        .streamline_chunk_rows(2)
        .group_chunk_rows(2)
        .build();
    let mut trx = TrxFile::create(backend, options).unwrap();
    trx.set_dimensions([64, 64, 32]).unwrap();
    let points: Vec<[f32; 3]> = (0..9).map(|i| [i as f32, 1.0, 2.0]).collect();
    trx.push_streamlines(&NdArray::from_rows(&points), &[3, 1, 5])
        .unwrap();
    trx.set_data_per_point("curvature", &NdArray::from_rows(&[[0.5f64, 1.0]; 9]))
        .unwrap();
    trx.set_data_per_streamline("cluster", &NdArray::from_slice(&[7i64, 8, 9]))
        .unwrap();
    trx.set_group("left", &[0, 2]).unwrap();
    trx.set_data_per_group("left", "volume", &NdArray::from_slice(&[12.5f32]))
        .unwrap();
    trx
}

fn assert_close(actual: &[[f32; 3]], expected: &[[f32; 3]]) {
    assert_eq!(actual.len(), expected.len());
    for (left, right) in actual.iter().zip(expected) {
        for axis in 0..3 {
            assert!(
                (left[axis] - right[axis]).abs() < 1e-4,
                "{left:?} != {right:?}"
            );
        }
    }
}

#[test]
fn directory_and_archive_forms_are_identical() {
    let dir = tempdir().expect("tmp");
    let mut trx = sample(Backend::memory());
    let folder = dir.path().join("bundle");
    let archive = dir.path().join("bundle.trx");
    trx.save(&folder).unwrap();
    trx.save(&archive).unwrap();

    let mut from_folder = TrxFile::load(&folder).unwrap();
    let mut from_archive = TrxFile::load(&archive).unwrap();
    assert_eq!(
        from_folder.backend().map(Backend::kind),
        Some(BackendKind::Directory)
    );
    assert_eq!(
        from_archive.backend().map(Backend::kind),
        Some(BackendKind::Archive)
    );

    let digest = trx.backend().unwrap().digest().unwrap();
    assert_eq!(from_folder.backend().unwrap().digest().unwrap(), digest);
    assert_eq!(from_archive.backend().unwrap().digest().unwrap(), digest);

    assert_eq!(from_archive.dimensions().unwrap(), [64, 64, 32]);
    assert_eq!(from_archive.groups().unwrap(), trx.groups().unwrap());
    assert_eq!(
        from_archive.data_per_point().unwrap(),
        from_folder.data_per_point().unwrap()
    );

    // A user-owned directory survives close; the archive stays readable.
    from_folder.close().unwrap();
    from_archive.close().unwrap();
    assert!(folder.join("zarr.json").is_file());
    assert!(TrxFile::load(&archive).is_ok());
    trx.close().unwrap();
}

fn read_json(path: &std::path::Path) -> serde_json::Value {
    serde_json::from_slice(&std::fs::read(path).unwrap()).unwrap()
}

#[test]
fn saved_layout_is_plain_zarr_v3() {
    let dir = tempdir().expect("tmp");
    let mut trx = sample(Backend::memory());
    let folder = dir.path().join("layout");
    trx.save(&folder).unwrap();

    let positions = read_json(&folder.join("positions").join("zarr.json"));
    assert_eq!(positions["zarr_format"], 3);
    assert_eq!(positions["node_type"], "array");
    assert_eq!(positions["shape"], serde_json::json!([9, 3]));
    assert_eq!(
        positions["chunk_grid"]["configuration"]["chunk_shape"],
        serde_json::json!([4, 3])
    );
    assert_eq!(positions["data_type"], "float32");
    let codecs = positions["codecs"].as_array().unwrap();
    assert!(codecs.iter().all(|codec| codec["name"] == "bytes"));
    // 9 rows in chunks of 4: three uncompressed chunk files, the last one padded.
    for chunk in ["0", "1", "2"] {
        let bytes = std::fs::read(folder.join("positions").join("c").join(chunk).join("0")).unwrap();
        assert_eq!(bytes.len(), 4 * 3 * 4);
    }
    assert!(folder.join("offsets").join("c").join("1").is_file());
    assert_eq!(
        read_json(&folder.join("groups").join("zarr.json"))["node_type"],
        "group"
    );

    let root = read_json(&folder.join("zarr.json"));
    assert_eq!(root["node_type"], "group");
    let attrs = &root["attributes"];
    assert_eq!(attrs["NB_STREAMLINES"], 3);
    assert_eq!(attrs["NB_POINTS"], 9);
    assert_eq!(attrs["DIMENSIONS"], serde_json::json!([64, 64, 32]));
    trx.close().unwrap();
}

#[test]
fn deepcopy_is_independent() {
    let mut trx = sample(Backend::temporary().unwrap());
    let mut copy = trx.deepcopy().unwrap();
    assert_eq!(copy.backend().map(Backend::kind), Some(BackendKind::Memory));
    assert_eq!(
        copy.backend().unwrap().digest().unwrap(),
        trx.backend().unwrap().digest().unwrap()
    );

    let extra = copy.select_into(&[1], true, Backend::memory()).unwrap();
    copy.append(&extra, AppendOptions::default()).unwrap();
    assert_eq!(copy.nb_streamlines().unwrap(), 4);
    assert_eq!(trx.nb_streamlines().unwrap(), 3);

    let mut extra = extra;
    extra.close().unwrap();
    copy.close().unwrap();
    trx.close().unwrap();
}

#[test]
fn temporary_backend_is_removed_on_close() {
    let mut trx = sample(Backend::temporary().unwrap());
    let location = trx.backend().and_then(Backend::location).unwrap().to_path_buf();
    assert!(location.join("positions").join("zarr.json").is_file());
    trx.close().unwrap();
    assert!(!location.exists());
    trx.close().unwrap();
    assert!(matches!(trx.streamlines(), Err(TrxError::Closed)));
}

#[test]
fn saving_replaces_previous_output() {
    let dir = tempdir().expect("tmp");
    let archive = dir.path().join("out.zip");
    let mut first = sample(Backend::memory());
    first.save(&archive).unwrap();

    let mut second = first.select_into(&[0], true, Backend::memory()).unwrap();
    second.save(&archive).unwrap();
    let mut reloaded = TrxFile::load(&archive).unwrap();
    assert_eq!(reloaded.nb_streamlines().unwrap(), 1);

    for trx in [&mut first, &mut second, &mut reloaded] {
        trx.close().unwrap();
    }
}

#[test]
fn tractogram_round_trip_through_disk() {
    let dir = tempdir().expect("tmp");
    let space = SpaceAttributes::new(
        [
            [1.5, 0.0, 0.0, -10.0],
            [0.0, 1.5, 0.0, -20.0],
            [0.0, 0.0, 1.5, 5.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
        [40, 40, 40],
    );
    let points = NdArray::from_rows(&[[1.0f64, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]);
    let mut tractogram = Tractogram::new(
        space,
        Space::Voxmm,
        Origin::Corner,
        RaggedArray::new(points, OffsetIndex::from_lengths(vec![1, 2])).unwrap(),
    )
    .unwrap()
    .with_data_per_point("t", NdArray::from_slice(&[0u8, 1, 2]))
    .unwrap();
    let original = tractogram.points().to_vec();

    let options = TrxOptions::builder().positions_dtype(DType::Float64).build();
    let mut trx = TrxFile::from_tractogram(&mut tractogram, &options).unwrap();
    assert_eq!(tractogram.space(), Space::Voxmm);
    assert_close(tractogram.points(), &original);
    assert_eq!(
        trx.backend().map(Backend::kind),
        Some(BackendKind::Temporary)
    );

    let path = dir.path().join("tracts.trx");
    trx.save(&path).unwrap();
    trx.close().unwrap();

    let mut loaded = TrxFile::load(&path).unwrap();
    let mut back = loaded.to_tractogram().unwrap();
    assert_eq!(back.data_per_point()["t"].to_vec::<u8>().unwrap(), vec![0, 1, 2]);
    back.to_voxmm().unwrap();
    back.to_corner().unwrap();
    assert_close(back.points(), &original);
    loaded.close().unwrap();
}
