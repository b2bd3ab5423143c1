//! Picking the file to stream out of a multi-file torrent.

use omega_core::media::EpisodeHint;
use omega_core::release::{self, ScoreFilter};

/// Scores at or below this carry a hard exclusion.
const EXCLUSION_THRESHOLD: i64 = -900;

/// File entry as listed by a debrid service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorrentFile {
    pub id: u64,
    pub path: String,
    pub size: u64,
}

/// How candidates are ordered before episode matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileRanking {
    /// Largest video first.
    Size,
    /// Release score first, excluded files dropped.
    Score(ScoreFilter),
}

/// Picks the file to stream.
///
/// Video files are ranked, then the first one matching the episode hint
/// wins; without a hint or a match the top ranked file is used. Torrents
/// without video fall back to their largest file.
pub fn select_file<'a>(
    files: &'a [TorrentFile],
    hint: EpisodeHint,
    ranking: FileRanking,
) -> Option<&'a TorrentFile> {
    let mut videos: Vec<&TorrentFile> = files
        .iter()
        .filter(|file| release::is_video_file(&file.path))
        .collect();

    if videos.is_empty() {
        return files.iter().max_by_key(|file| file.size);
    }

    match ranking {
        FileRanking::Size => videos.sort_by(|a, b| b.size.cmp(&a.size)),
        FileRanking::Score(filter) => {
            let mut scored: Vec<(i64, &TorrentFile)> = videos
                .iter()
                .map(|file| (release::score_file(&file.path, file.size, &filter), *file))
                .filter(|(score, _)| *score > EXCLUSION_THRESHOLD)
                .collect();
            if scored.is_empty() {
                tracing::warn!("Every file hit an exclusion, falling back to size order");
                videos.sort_by(|a, b| b.size.cmp(&a.size));
            } else {
                scored.sort_by(|a, b| b.0.cmp(&a.0));
                videos = scored.into_iter().map(|(_, file)| file).collect();
            }
        }
    }

    if let Some((season, episode)) = hint.pair() {
        let matched = videos
            .iter()
            .find(|file| release::matches_episode(&file.path, season, episode));
        match matched {
            Some(file) => return Some(*file),
            None => tracing::warn!(
                "No file matches S{season:02}E{episode:02}, using top ranked file"
            ),
        }
    }

    videos.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GIB: u64 = 1024 * 1024 * 1024;

    fn file(id: u64, path: &str, size: u64) -> TorrentFile {
        TorrentFile {
            id,
            path: path.to_string(),
            size,
        }
    }

    #[test]
    fn test_largest_video_wins_without_hint() {
        let files = vec![
            file(1, "/Movie/sample.mkv", GIB / 10),
            file(2, "/Movie/Movie.2020.1080p.mkv", 8 * GIB),
            file(3, "/Movie/extras.zip", 20 * GIB),
        ];
        let picked = select_file(&files, EpisodeHint::none(), FileRanking::Size).unwrap();
        assert_eq!(picked.id, 2);
    }

    #[test]
    fn test_episode_hint_selects_matching_file() {
        let files = vec![
            file(1, "Show.S01E01.1080p.mkv", 3 * GIB),
            file(2, "Show.S01E02.1080p.mkv", 2 * GIB),
            file(3, "Show.S01E03.1080p.mkv", 4 * GIB),
        ];
        let hint = EpisodeHint {
            season: Some(1),
            episode: Some(2),
        };
        let picked = select_file(&files, hint, FileRanking::Score(ScoreFilter::default())).unwrap();
        assert_eq!(picked.id, 2);
    }

    #[test]
    fn test_unmatched_hint_falls_back_to_top_ranked() {
        let files = vec![
            file(1, "Show.S01E01.720p.mkv", 3 * GIB),
            file(2, "Show.S01E02.2160p.REMUX.mkv", 2 * GIB),
        ];
        let hint = EpisodeHint {
            season: Some(4),
            episode: Some(1),
        };
        let picked = select_file(&files, hint, FileRanking::Score(ScoreFilter::default())).unwrap();
        assert_eq!(picked.id, 2);
    }

    #[test]
    fn test_exclusions_drop_files_unless_nothing_is_left() {
        let filter = ScoreFilter {
            exclude_hevc: true,
            ..ScoreFilter::default()
        };
        let files = vec![
            file(1, "Movie.2160p.x265.mkv", 30 * GIB),
            file(2, "Movie.1080p.x264.mkv", 10 * GIB),
        ];
        let picked = select_file(&files, EpisodeHint::none(), FileRanking::Score(filter)).unwrap();
        assert_eq!(picked.id, 2);

        let only_hevc = vec![file(1, "Movie.2160p.x265.mkv", 30 * GIB)];
        let picked = select_file(&only_hevc, EpisodeHint::none(), FileRanking::Score(filter));
        assert_eq!(picked.map(|f| f.id), Some(1));
    }

    #[test]
    fn test_no_video_falls_back_to_largest_file() {
        let files = vec![file(1, "a.rar", 5), file(2, "b.rar", 9)];
        let picked = select_file(&files, EpisodeHint::none(), FileRanking::Size);
        assert_eq!(picked.map(|f| f.id), Some(2));
        assert!(select_file(&[], EpisodeHint::none(), FileRanking::Size).is_none());
    }
}
