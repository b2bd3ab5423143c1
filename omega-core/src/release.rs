//! Release-name parsing and scoring.
//!
//! Scene release names carry quality, source, codec and audio markers. The
//! scores derived here rank instant-cache candidates and pick the file a
//! debrid provider should stream.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Score of a release hit by a hard exclusion.
pub const EXCLUDED_SCORE: i64 = -1000;
/// Score of cams, telesyncs and samples.
pub const GARBAGE_SCORE: i64 = -500;

const VIDEO_EXTENSIONS: [&str; 5] = [".mp4", ".mkv", ".avi", ".mov", ".webm"];
const GIB: u64 = 1024 * 1024 * 1024;

static RELEASE_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-([a-zA-Z0-9]+)(?:\.[a-z0-9]{3,4})?$").expect("valid regex"));

/// Group suffixes that are really technical tags.
const NOT_A_GROUP: [&str; 11] = [
    "264", "265", "hevc", "10bit", "hdr", "remux", "4k", "1080p", "720p", "webdl", "bluray",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Quality {
    #[serde(rename = "4K")]
    Uhd,
    #[serde(rename = "1080p")]
    FullHd,
    #[serde(rename = "720p")]
    Hd,
    #[serde(rename = "480p")]
    Sd,
    Unknown,
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Quality::Uhd => "4K",
            Quality::FullHd => "1080p",
            Quality::Hd => "720p",
            Quality::Sd => "480p",
            Quality::Unknown => "Unknown",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseSource {
    Remux,
    Bluray,
    Web,
    Hdtv,
    Cam,
    Unknown,
}

/// Markers recognized in one release name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReleaseInfo {
    pub quality: Quality,
    pub source: ReleaseSource,
    pub codecs: Vec<&'static str>,
    pub audio: Vec<&'static str>,
    pub hdr: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

impl ReleaseInfo {
    pub fn parse(name: &str) -> Self {
        let release = ReleaseName::new(name);
        Self {
            quality: release.quality(),
            source: release.source(),
            codecs: release.codecs(),
            audio: release.audio(),
            hdr: release.hdr(),
            group: release_group(name),
        }
    }
}

/// Hard exclusions applied before scoring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreFilter {
    pub exclude_hevc: bool,
    pub exclude_eac3: bool,
    pub exclude_dolby_vision: bool,
}

/// Lowercased name plus its separator-delimited words.
///
/// Short markers such as `ts` or `dv` only count as whole words, so titles
/// like "Cats" do not read as telesyncs.
struct ReleaseName {
    lower: String,
    words: Vec<String>,
}

impl ReleaseName {
    fn new(name: &str) -> Self {
        let lower = name.to_lowercase();
        let words = lower
            .split(|c: char| !(c.is_ascii_alphanumeric() || c == '+'))
            .filter(|word| !word.is_empty())
            .map(str::to_string)
            .collect();
        Self { lower, words }
    }

    fn has_text(&self, needles: &[&str]) -> bool {
        needles.iter().any(|needle| self.lower.contains(needle))
    }

    fn has_word(&self, words: &[&str]) -> bool {
        self.words.iter().any(|word| words.contains(&word.as_str()))
    }

    fn quality(&self) -> Quality {
        if self.has_text(&["2160p", "uhd"]) || self.has_word(&["4k"]) {
            Quality::Uhd
        } else if self.has_text(&["1080p"]) {
            Quality::FullHd
        } else if self.has_text(&["720p"]) {
            Quality::Hd
        } else if self.has_text(&["480p"]) {
            Quality::Sd
        } else {
            Quality::Unknown
        }
    }

    fn source(&self) -> ReleaseSource {
        if self.has_text(&["remux"]) {
            ReleaseSource::Remux
        } else if self.has_text(&["bluray", "bdrip", "brrip"]) {
            ReleaseSource::Bluray
        } else if self.has_text(&["webdl", "web-dl", "webrip"])
            || self.has_word(&["web", "hbo", "amzn", "nf"])
        {
            ReleaseSource::Web
        } else if self.has_text(&["hdtv"]) {
            ReleaseSource::Hdtv
        } else if self.is_cam() {
            ReleaseSource::Cam
        } else {
            ReleaseSource::Unknown
        }
    }

    fn is_cam(&self) -> bool {
        self.has_text(&["telesync", "camrip"]) || self.has_word(&["cam", "ts", "hdcam"])
    }

    fn is_hevc(&self) -> bool {
        self.has_text(&["hevc", "h265", "x265", "h.265"])
    }

    fn is_eac3(&self) -> bool {
        self.has_text(&["eac3", "ddp", "dd+", "dolby digital plus"])
    }

    fn is_dolby_vision(&self) -> bool {
        self.has_text(&["dolby vision", "dovi"]) || self.has_word(&["dv"])
    }

    fn codecs(&self) -> Vec<&'static str> {
        let mut codecs = Vec::new();
        if self.is_hevc() {
            codecs.push("hevc");
        }
        if self.has_word(&["av1"]) {
            codecs.push("av1");
        }
        if self.has_text(&["h264", "x264", "h.264"]) || self.has_word(&["avc"]) {
            codecs.push("h264");
        }
        codecs
    }

    fn audio(&self) -> Vec<&'static str> {
        let mut audio = Vec::new();
        if self.has_text(&["atmos"]) {
            audio.push("atmos");
        }
        if self.has_text(&["dts-hd", "dts:x", "dtsx", "dts-x"]) {
            audio.push("dts-x");
        }
        if self.has_text(&["truehd"]) {
            audio.push("truehd");
        }
        if self.is_eac3() {
            audio.push("eac3");
        }
        if self.has_word(&["ac3"]) || self.has_text(&["dd5.1"]) {
            audio.push("ac3");
        }
        if self.has_text(&["aac"]) {
            audio.push("aac");
        }
        audio
    }

    fn hdr(&self) -> Vec<&'static str> {
        let mut hdr = Vec::new();
        if self.is_dolby_vision() {
            hdr.push("dolby_vision");
        }
        if self.has_text(&["hdr10+", "hdr10plus"]) {
            hdr.push("hdr10+");
        } else if self.has_word(&["hdr", "hdr10"]) {
            hdr.push("hdr10");
        }
        hdr
    }
}

/// Trailing `-Group` of a release name, ignoring technical tags.
pub fn release_group(name: &str) -> Option<String> {
    let group = RELEASE_GROUP.captures(name)?.get(1)?.as_str();
    if NOT_A_GROUP.contains(&group.to_lowercase().as_str()) {
        None
    } else {
        Some(group.to_string())
    }
}

/// Scores a release name; higher is better.
///
/// Excluded releases score [`EXCLUDED_SCORE`] and garbage scores
/// [`GARBAGE_SCORE`]. Otherwise quality, source, audio and HDR markers add
/// up, plus one point per GiB of size capped at 50.
pub fn score_file(name: &str, size_bytes: u64, filter: &ScoreFilter) -> i64 {
    let release = ReleaseName::new(name);

    if filter.exclude_hevc && release.is_hevc() {
        return EXCLUDED_SCORE;
    }
    if filter.exclude_eac3 && (release.is_eac3() || release.has_text(&["atmos"])) {
        return EXCLUDED_SCORE;
    }
    if filter.exclude_dolby_vision && (release.is_dolby_vision() || release.has_text(&["hdr10+"]))
    {
        return EXCLUDED_SCORE;
    }
    if release.is_cam() || release.has_text(&["sample"]) {
        return GARBAGE_SCORE;
    }

    let mut score = match release.quality() {
        Quality::Uhd => 200,
        Quality::FullHd => 100,
        Quality::Hd => 50,
        Quality::Sd | Quality::Unknown => 0,
    };

    score += match release.source() {
        ReleaseSource::Remux => 100,
        ReleaseSource::Bluray => 80,
        ReleaseSource::Web => 50,
        ReleaseSource::Hdtv | ReleaseSource::Cam | ReleaseSource::Unknown => 0,
    };

    let audio = release.audio();
    if audio
        .iter()
        .any(|a| matches!(*a, "atmos" | "truehd" | "dts-x"))
    {
        score += 40;
    } else if audio.contains(&"eac3") {
        score += 20;
    }

    let hdr = release.hdr();
    if hdr.contains(&"dolby_vision") {
        score += 50;
    }
    if hdr.contains(&"hdr10") || hdr.contains(&"hdr10+") {
        score += 30;
    }

    score + (size_bytes / GIB).min(50) as i64
}

/// Whether a file name carries the given episode (`S01E02`, `S1E2`, `1x02`, `1x2`).
pub fn matches_episode(name: &str, season: u32, episode: u32) -> bool {
    let pattern = format!(
        r"(?i)(?:^|[^0-9a-z])(?:s0*{season}[ ._-]?e0*{episode}|0*{season}x0*{episode})(?:[^0-9]|$)"
    );
    Regex::new(&pattern).is_ok_and(|re| re.is_match(name))
}

pub fn is_video_file(path: &str) -> bool {
    let lower = path.to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_release_name() {
        let info = ReleaseInfo::parse(
            "The.Expanse.S01E01.2160p.BluRay.REMUX.HEVC.DV.HDR10.TrueHD.Atmos-FraMeSToR.mkv",
        );
        assert_eq!(info.quality, Quality::Uhd);
        assert_eq!(info.source, ReleaseSource::Remux);
        assert_eq!(info.codecs, vec!["hevc"]);
        assert_eq!(info.audio, vec!["atmos", "truehd"]);
        assert_eq!(info.hdr, vec!["dolby_vision", "hdr10"]);
        assert_eq!(info.group.as_deref(), Some("FraMeSToR"));
    }

    #[test]
    fn test_release_group_skips_technical_suffixes() {
        assert_eq!(release_group("Movie.2020.1080p-10bit.mkv"), None);
        assert_eq!(release_group("Movie 2020 no group"), None);
        assert_eq!(release_group("Movie.2020.WEB-DL-NTb").as_deref(), Some("NTb"));
    }

    #[test]
    fn test_short_markers_need_whole_words() {
        assert_eq!(ReleaseInfo::parse("Cats.2019.1080p.mkv").source, ReleaseSource::Unknown);
        assert_eq!(ReleaseInfo::parse("Movie.2023.TS.x264").source, ReleaseSource::Cam);
        assert!(ReleaseInfo::parse("Advent.2020.720p.mkv").hdr.is_empty());
    }

    #[test]
    fn test_score_orders_by_quality_and_source() {
        let filter = ScoreFilter::default();
        let remux = score_file("Dune.2021.2160p.REMUX.mkv", 0, &filter);
        let web = score_file("Dune.2021.1080p.WEB-DL.mkv", 0, &filter);
        let plain = score_file("Dune.2021.720p.mkv", 0, &filter);
        assert_eq!(remux, 300);
        assert_eq!(web, 150);
        assert_eq!(plain, 50);
    }

    #[test]
    fn test_score_adds_capped_size_bonus() {
        let filter = ScoreFilter::default();
        assert_eq!(score_file("Movie.1080p.mkv", 3 * GIB, &filter), 103);
        assert_eq!(score_file("Movie.1080p.mkv", 90 * GIB, &filter), 150);
    }

    #[test]
    fn test_exclusions_and_garbage() {
        let no_hevc = ScoreFilter {
            exclude_hevc: true,
            ..ScoreFilter::default()
        };
        assert_eq!(score_file("Movie.2160p.x265.mkv", 0, &no_hevc), EXCLUDED_SCORE);
        assert_eq!(
            score_file("Movie.2023.HDCAM.mkv", 0, &ScoreFilter::default()),
            GARBAGE_SCORE
        );
        assert_eq!(
            score_file("Movie.1080p.sample.mkv", 0, &ScoreFilter::default()),
            GARBAGE_SCORE
        );
    }

    #[test]
    fn test_episode_patterns() {
        assert!(matches_episode("The.Expanse.S01E02.1080p.mkv", 1, 2));
        assert!(matches_episode("the expanse s1e2.mkv", 1, 2));
        assert!(matches_episode("The Expanse 1x02.mkv", 1, 2));
        assert!(matches_episode("The Expanse 1x2 Remastered.mkv", 1, 2));
        assert!(!matches_episode("The.Expanse.S01E12.mkv", 1, 2));
        assert!(!matches_episode("The.Expanse.S11E02.mkv", 1, 2));
    }

    #[test]
    fn test_video_extensions() {
        assert!(is_video_file("/Show/Episode.MKV"));
        assert!(!is_video_file("/Show/readme.nfo"));
    }
}
