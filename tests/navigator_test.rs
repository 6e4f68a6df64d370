//! End-to-end navigation over raw volumes on disk

use ndarray::Array3;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use volslice::raw::write_array_volume;
use volslice::{
    Axis, Config, DataType, PrefetchEvent, RawVolumeOpener, SliceError, SliceNavigator,
    SourceOpener, VolumeShape,
};

fn seismic(depth: usize, height: usize, width: usize) -> Array3<f32> {
    Array3::from_shape_fn((depth, height, width), |(d, h, w)| {
        d as f32 * 0.5 - h as f32 + w as f32 * 0.25
    })
}

async fn write_volume(dir: &TempDir, name: &str, data: &Array3<f32>) -> Arc<dyn SourceOpener> {
    let url = format!("file://{}", dir.path().join(name).display());
    write_array_volume(&url, data).await.unwrap();
    Arc::new(RawVolumeOpener::new(&url).unwrap())
}

async fn drain_ready(navigator: &mut SliceNavigator, count: usize) -> Vec<usize> {
    let mut indices = Vec::new();
    while indices.len() < count {
        let event = tokio::time::timeout(Duration::from_secs(5), navigator.next_event())
            .await
            .unwrap();
        match event {
            Some(PrefetchEvent::SliceReady { index, .. }) => indices.push(index),
            other => panic!("unexpected event: {:?}", other),
        }
    }
    indices
}

#[tokio::test]
async fn test_navigate_raw_volume_all_axes() {
    let temp_dir = TempDir::new().unwrap();
    let data = seismic(6, 5, 4);
    let opener = write_volume(&temp_dir, "survey", &data).await;

    let mut navigator = SliceNavigator::open(opener, Config::default()).await.unwrap();
    assert_eq!(navigator.shape(), VolumeShape::new(6, 5, 4));
    assert_eq!(navigator.data_type(), DataType::F32);

    for axis in Axis::ALL {
        let index = 2;
        let slice = navigator.navigate(axis, index).await.unwrap();
        let expected = data.index_axis(ndarray::Axis(axis.index()), index);
        assert_eq!(slice.to_array::<f32>().unwrap(), expected);
    }

    navigator.close().await;
}

#[tokio::test]
async fn test_scrubbing_is_served_from_prefetch() {
    let temp_dir = TempDir::new().unwrap();
    let opener = write_volume(&temp_dir, "survey", &seismic(20, 8, 8)).await;

    let mut navigator = SliceNavigator::open(opener, Config::default()).await.unwrap();

    navigator.navigate(Axis::Depth, 10).await.unwrap();
    assert_eq!(drain_ready(&mut navigator, 4).await, vec![11, 9, 12, 8]);

    // Next step forward was prefetched
    navigator.navigate(Axis::Depth, 11).await.unwrap();
    let stats = navigator.cache().stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);

    navigator.close().await;
}

#[tokio::test]
async fn test_cache_bounded_while_scrubbing() {
    let temp_dir = TempDir::new().unwrap();
    let opener = write_volume(&temp_dir, "survey", &seismic(40, 4, 4)).await;

    let mut config = Config::default();
    config.cache.capacity = 5;
    config.prefetch.range = 1;
    let mut navigator = SliceNavigator::open(opener, config).await.unwrap();

    for index in 0..40 {
        navigator.navigate(Axis::Depth, index).await.unwrap();
        assert!(navigator.cache().len() <= 5);
    }
    navigator.absorb_prefetched();

    let stats = navigator.cache().stats();
    assert_eq!(stats.max_size, 5);
    assert!(stats.current_size <= 5);
    assert!(stats.evictions > 0);

    navigator.close().await;
}

#[tokio::test]
async fn test_load_dataset_switches_volume() {
    let temp_dir = TempDir::new().unwrap();
    let first = write_volume(&temp_dir, "first", &seismic(6, 4, 4)).await;
    let second_data = Array3::from_elem((3, 2, 2), 7.0f32);
    let second = write_volume(&temp_dir, "second", &second_data).await;

    let mut navigator = SliceNavigator::open(first, Config::default()).await.unwrap();
    navigator.navigate(Axis::Depth, 5).await.unwrap();

    navigator.load_dataset(second).await.unwrap();
    assert_eq!(navigator.shape(), VolumeShape::new(3, 2, 2));
    assert!(navigator.cache().is_empty());
    assert_eq!(navigator.cache().stats().misses, 0);

    // Index valid for the old volume only
    let err = navigator.navigate(Axis::Depth, 5).await.unwrap_err();
    assert!(matches!(err, SliceError::OutOfBounds(_)));

    let slice = navigator.navigate(Axis::Depth, 2).await.unwrap();
    assert_eq!(slice.value_range().map(|r| (r.min, r.max)), Some((7.0, 7.0)));

    navigator.close().await;
}

#[tokio::test]
async fn test_load_missing_dataset_keeps_current() {
    let temp_dir = TempDir::new().unwrap();
    let opener = write_volume(&temp_dir, "survey", &seismic(4, 4, 4)).await;
    let mut navigator = SliceNavigator::open(opener, Config::default()).await.unwrap();

    let missing_dir = temp_dir.path().join("nope");
    let missing = Arc::new(RawVolumeOpener::new(missing_dir.to_str().unwrap()).unwrap());
    assert!(navigator.load_dataset(missing).await.is_err());

    assert_eq!(navigator.shape(), VolumeShape::new(4, 4, 4));
    assert!(navigator.navigate(Axis::Width, 3).await.is_ok());

    navigator.close().await;
}
