//! Adaptive streaming manifest assembly.
//!
//! Manifests are built only from variants that completed transcoding and list
//! them in ascending bitrate order, so players start on the cheapest rendition
//! and switch up. Variant URIs are relative to the manifest's own key prefix
//! (`videos/{id}/`), which keeps manifests valid behind any CDN domain.

use vidra_core::models::QualityVariant;

fn sorted_ascending<'a>(variants: &[&'a QualityVariant]) -> Vec<&'a QualityVariant> {
    let mut sorted: Vec<&QualityVariant> = variants.to_vec();
    sorted.sort_by_key(|v| v.bitrate_kbps);
    sorted
}

fn relative_uri(variant: &QualityVariant) -> String {
    format!("{q}/{q}.{c}", q = variant.quality, c = variant.container)
}

/// Build an HLS master playlist over the completed variants.
pub fn build_hls_master(variants: &[&QualityVariant]) -> String {
    let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n");
    for variant in sorted_ascending(variants) {
        playlist.push_str(&format!(
            "#EXT-X-STREAM-INF:BANDWIDTH={bandwidth},RESOLUTION={resolution},CODECS=\"avc1.640028,mp4a.40.2\"\n{uri}\n",
            bandwidth = variant.bitrate_kbps as u64 * 1000,
            resolution = variant.resolution(),
            uri = relative_uri(variant),
        ));
    }
    playlist
}

/// Build a static DASH MPD over the completed variants.
pub fn build_dash_mpd(variants: &[&QualityVariant], duration_secs: f64) -> String {
    let mut mpd = format!(
        concat!(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n",
            "<MPD xmlns=\"urn:mpeg:dash:schema:mpd:2011\" type=\"static\" ",
            "mediaPresentationDuration=\"PT{duration:.3}S\" ",
            "profiles=\"urn:mpeg:dash:profile:isoff-on-demand:2011\">\n",
            "  <Period>\n",
            "    <AdaptationSet mimeType=\"video/mp4\" segmentAlignment=\"true\">\n",
        ),
        duration = duration_secs,
    );
    for variant in sorted_ascending(variants) {
        mpd.push_str(&format!(
            concat!(
                "      <Representation id=\"{id}\" codecs=\"avc1.640028\" ",
                "width=\"{width}\" height=\"{height}\" bandwidth=\"{bandwidth}\">\n",
                "        <BaseURL>{uri}</BaseURL>\n",
                "      </Representation>\n",
            ),
            id = variant.quality,
            width = variant.width,
            height = variant.height,
            bandwidth = variant.bitrate_kbps as u64 * 1000,
            uri = relative_uri(variant),
        ));
    }
    mpd.push_str("    </AdaptationSet>\n  </Period>\n</MPD>\n");
    mpd
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn variant(quality: &str, width: u32, height: u32, bitrate_kbps: u32) -> QualityVariant {
        QualityVariant::new(Uuid::new_v4(), quality, width, height, bitrate_kbps)
    }

    #[test]
    fn hls_master_lists_variants_ascending() {
        let hi = variant("1080p", 1920, 1080, 8000);
        let lo = variant("360p", 640, 360, 1000);
        let playlist = build_hls_master(&[&hi, &lo]);

        assert!(playlist.starts_with("#EXTM3U\n"));
        let lo_pos = playlist.find("360p/360p.mp4").unwrap();
        let hi_pos = playlist.find("1080p/1080p.mp4").unwrap();
        assert!(lo_pos < hi_pos);
        assert!(playlist.contains("BANDWIDTH=1000000,RESOLUTION=640x360"));
    }

    #[test]
    fn dash_mpd_carries_duration_and_representations() {
        let mid = variant("480p", 854, 480, 2500);
        let mpd = build_dash_mpd(&[&mid], 61.5);

        assert!(mpd.contains("mediaPresentationDuration=\"PT61.500S\""));
        assert!(mpd.contains("<Representation id=\"480p\""));
        assert!(mpd.contains("bandwidth=\"2500000\""));
        assert!(mpd.contains("<BaseURL>480p/480p.mp4</BaseURL>"));
    }

    #[test]
    fn manifests_over_empty_set_have_no_entries() {
        let playlist = build_hls_master(&[]);
        assert_eq!(playlist, "#EXTM3U\n#EXT-X-VERSION:3\n");
    }
}
