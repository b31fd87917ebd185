//! Grid coverage and end-to-end tile set scenarios.

use proptest::prelude::*;
use relight_tiles::{
    ImageFormat, ImageInfo, Region, SizeConvention, TileKey, TileSpec, UrlOptions,
    build_tile_sets, generate_tile_grid,
};

const ALBEDO: &str = "https://iiif.example.org/iiif/image/albedo";
const NORMAL: &str = "https://iiif.example.org/iiif/image/normal";

const INFO: &str = r#"{
    "@context": "http://iiif.io/api/image/3/context.json",
    "id": "https://iiif.example.org/iiif/image/albedo",
    "type": "ImageService3",
    "width": 3208,
    "height": 4260,
    "tiles": [{ "width": 256, "height": 256, "scaleFactors": [1, 2, 4, 8, 16, 32] }]
}"#;

#[test]
fn scenario_pyramid_from_info_json() {
    let info = ImageInfo::from_json(INFO.as_bytes()).unwrap();
    let sets = build_tile_sets(0, &info, ALBEDO, NORMAL, &UrlOptions::default()).unwrap();

    let coarsest = sets.level(0).unwrap();
    assert_eq!(coarsest.len(), 1);
    assert_eq!(coarsest.albedo_tiles[0].region, Region::Full);
    assert_eq!(
        coarsest.normal_tiles[0].url,
        format!("{NORMAL}/full/101,134/0/default.jpg")
    );

    let finest = sets.level(5).unwrap();
    assert_eq!(finest.len(), 221);
}

#[test]
fn generated_keys_match_host_urls() {
    let info = ImageInfo::from_json(INFO.as_bytes()).unwrap();
    let sets = build_tile_sets(0, &info, ALBEDO, NORMAL, &UrlOptions::default()).unwrap();
    let tile = &sets.level(3).unwrap().albedo_tiles[7];

    // A host that writes the width-only size form still hits the same key.
    let host_url = UrlOptions {
        size_convention: SizeConvention::WidthOnly,
        format: None,
    }
    .tile_url(
        ALBEDO,
        tile.region,
        tile.pixel_width,
        tile.pixel_height,
        &ImageFormat::default(),
    );
    assert_eq!(
        TileKey::from_url(&host_url, tile.pixel_width).unwrap(),
        tile.key(ALBEDO)
    );
}

#[test]
fn max_size_on_single_tile_level_matches_generated_key() {
    let info = ImageInfo::from_json(INFO.as_bytes()).unwrap();
    let sets = build_tile_sets(0, &info, ALBEDO, NORMAL, &UrlOptions::default()).unwrap();
    let tile = &sets.level(0).unwrap().albedo_tiles[0];

    let max = TileKey::from_url(&format!("{ALBEDO}/full/max/0/default.jpg"), 101).unwrap();
    let height_only = TileKey::from_url(&format!("{ALBEDO}/full/,134/0/default.jpg"), 101).unwrap();
    assert_eq!(max, tile.key(ALBEDO));
    assert_eq!(height_only, tile.key(ALBEDO));
}

fn covered_area(width: u32, height: u32, tile: u32, factors: &[u32], level: u32) -> (u64, bool) {
    let spec = TileSpec::new(tile, factors.to_vec());
    let tiles = generate_tile_grid(
        ALBEDO,
        width,
        height,
        &spec,
        level,
        &UrlOptions::default(),
        &ImageFormat::default(),
    )
    .unwrap();

    let mut area = 0u64;
    let mut disjoint = true;
    for (i, a) in tiles.iter().enumerate() {
        area += u64::from(a.width) * u64::from(a.height);
        for b in &tiles[i + 1..] {
            let overlap_x = a.x < b.x + b.width && b.x < a.x + a.width;
            let overlap_y = a.y < b.y + b.height && b.y < a.y + a.height;
            if overlap_x && overlap_y {
                disjoint = false;
            }
        }
    }
    (area, disjoint)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn tiles_cover_image_exactly(
        width in 1u32..3000,
        height in 1u32..3000,
        tile in prop::sample::select(vec![64u32, 128, 256, 512]),
        depth in 1usize..6,
        level_seed in 0u32..6,
    ) {
        let factors: Vec<u32> = (0..depth).map(|i| 1u32 << i).collect();
        let level = level_seed % u32::try_from(depth).unwrap();
        let (area, disjoint) = covered_area(width, height, tile, &factors, level);
        prop_assert!(disjoint);
        prop_assert_eq!(area, u64::from(width) * u64::from(height));
    }

    #[test]
    fn requested_sizes_stay_within_tile(
        width in 1u32..5000,
        height in 1u32..5000,
        level in 0u32..4,
    ) {
        let spec = TileSpec::new(256, vec![8, 4, 2, 1]);
        let tiles = generate_tile_grid(
            ALBEDO,
            width,
            height,
            &spec,
            level,
            &UrlOptions::default(),
            &ImageFormat::default(),
        )
        .unwrap();
        for tile in &tiles {
            prop_assert!(tile.pixel_width >= 1 && tile.pixel_width <= 256);
            prop_assert!(tile.pixel_height >= 1 && tile.pixel_height <= 256);
        }
    }
}
