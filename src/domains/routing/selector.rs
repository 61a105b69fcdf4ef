//! Compression method selection.
//!
//! The cascade below is a hard contract: branch conditions and their
//! evaluation order decide where a document is processed. The strings
//! attached to each branch are presentation-only.

use super::types::{
    CompressionDecision, CompressionMethod, Complexity, FileAnalysis, MethodPreference,
    MethodValidation,
};

/// Hard limit for in-browser processing (MB).
const CLIENT_SIDE_MAX_MB: f64 = 100.0;

/// Hard limit for the server pipeline (MB).
const SERVER_SIDE_MAX_MB: f64 = 500.0;

/// Flat upload/download overhead added to server-side estimates (seconds).
const SERVER_TRANSFER_OVERHEAD_SECS: f64 = 5.0;

/// Pick a compression method for the analyzed document.
///
/// Pure function of its arguments; calling it twice with the same analysis
/// and preference yields the same method.
pub fn choose(
    analysis: &FileAnalysis,
    preference: Option<MethodPreference>,
) -> CompressionDecision {
    match preference {
        Some(MethodPreference::Privacy) => {
            return decision(
                CompressionMethod::ClientSide,
                analysis,
                "Privacy preference keeps the file on this device".to_string(),
                "Your file will not leave this device.".to_string(),
            );
        }
        Some(MethodPreference::Performance) => {
            return decision(
                CompressionMethod::ServerSide,
                analysis,
                "Performance preference uses the server pipeline".to_string(),
                "Server-side processing gives the fastest result for this preference."
                    .to_string(),
            );
        }
        None => {}
    }

    if analysis.size_mb > 50.0 || analysis.pages > 1000 {
        return decision(
            CompressionMethod::ServerSide,
            analysis,
            format!(
                "Large file ({:.0} MB, {} pages) exceeds what runs comfortably in the browser",
                analysis.size_mb, analysis.pages
            ),
            "Server-side processing handles large documents reliably.".to_string(),
        );
    }

    if analysis.pages > 100 {
        return decision(
            CompressionMethod::ServerSide,
            analysis,
            format!("High page count ({} pages)", analysis.pages),
            "Documents with many pages compress faster on the server.".to_string(),
        );
    }

    if analysis.is_text_heavy && analysis.pages > 50 {
        return decision(
            CompressionMethod::ServerSide,
            analysis,
            "Text-heavy document; server-side processing preserves text searchability"
                .to_string(),
            "Keeping text searchable works best with the server pipeline.".to_string(),
        );
    }

    if analysis.is_image_heavy && analysis.pages <= 100 && analysis.size_mb <= 50.0 {
        return decision(
            CompressionMethod::ClientSide,
            analysis,
            "Image-heavy document compresses well locally".to_string(),
            "Scanned and image-heavy files shrink well without leaving this device."
                .to_string(),
        );
    }

    if analysis.pages < 50 && analysis.size_mb < 10.0 {
        return decision(
            CompressionMethod::ClientSide,
            analysis,
            "Small file compresses quickly and privately on this device".to_string(),
            "Small documents finish fastest right in the browser.".to_string(),
        );
    }

    decision(
        CompressionMethod::ServerSide,
        analysis,
        "Server-side processing gives the most reliable quality for this document"
            .to_string(),
        "The server pipeline is the safe default for mixed documents.".to_string(),
    )
}

fn decision(
    method: CompressionMethod,
    analysis: &FileAnalysis,
    reason: String,
    recommendation: String,
) -> CompressionDecision {
    CompressionDecision {
        method,
        reason,
        estimated_time: estimate_time(analysis, method),
        recommendation,
    }
}

/// Human-readable duration estimate for processing `analysis` with `method`.
///
/// Per-page constants differ by complexity tier; in-browser processing is
/// several times slower per page than the server pipeline, which in turn
/// pays a flat transfer overhead.
pub fn estimate_time(analysis: &FileAnalysis, method: CompressionMethod) -> String {
    let per_page = match (analysis.complexity, method) {
        (Complexity::High, CompressionMethod::ClientSide) => 3.0,
        (Complexity::Medium, CompressionMethod::ClientSide) => 1.5,
        (Complexity::Low, CompressionMethod::ClientSide) => 0.5,
        (Complexity::High, CompressionMethod::ServerSide) => 0.4,
        (Complexity::Medium, CompressionMethod::ServerSide) => 0.2,
        (Complexity::Low, CompressionMethod::ServerSide) => 0.1,
    };

    let mut total = f64::from(analysis.pages) * per_page;
    if method == CompressionMethod::ServerSide {
        total += SERVER_TRANSFER_OVERHEAD_SECS;
    }

    format_duration(total)
}

fn format_duration(seconds: f64) -> String {
    if seconds < 60.0 {
        format!("~{}s", seconds.ceil().max(1.0) as u64)
    } else if seconds < 3600.0 {
        format!("~{} min", (seconds / 60.0).ceil() as u64)
    } else {
        format!("~{} h", (seconds / 3600.0).ceil() as u64)
    }
}

/// Check a finalized (possibly user-overridden) method against the chosen
/// backend's limits. Warnings are advisory; `valid == false` means the
/// operation should not be attempted.
pub fn validate(analysis: &FileAnalysis, method: CompressionMethod) -> MethodValidation {
    match method {
        CompressionMethod::ClientSide => {
            if analysis.size_mb > CLIENT_SIDE_MAX_MB {
                return MethodValidation::invalid(format!(
                    "Files over {:.0} MB cannot be compressed in the browser",
                    CLIENT_SIDE_MAX_MB
                ));
            }
            if analysis.pages > 2000 {
                return MethodValidation::warn(
                    "Very high page count; in-browser compression may be slow",
                );
            }
            if analysis.size_mb > 50.0 {
                return MethodValidation::warn(
                    "Large file; in-browser compression may be slow",
                );
            }
            MethodValidation::ok()
        }
        CompressionMethod::ServerSide => {
            if analysis.size_mb > SERVER_SIDE_MAX_MB {
                return MethodValidation::invalid(format!(
                    "Files over {:.0} MB exceed the server pipeline limit",
                    SERVER_SIDE_MAX_MB
                ));
            }
            MethodValidation::ok()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(pages: u32, size_mb: f64) -> FileAnalysis {
        let complexity = if size_mb / f64::from(pages.max(1)) > 0.5 {
            Complexity::High
        } else {
            Complexity::Medium
        };
        FileAnalysis {
            pages,
            size_mb,
            is_image_heavy: false,
            is_text_heavy: false,
            complexity,
        }
    }

    #[test]
    fn privacy_preference_forces_client_side() {
        // Even a file that every heuristic would send to the server
        let big = analysis(5000, 200.0);
        let d = choose(&big, Some(MethodPreference::Privacy));
        assert_eq!(d.method, CompressionMethod::ClientSide);
    }

    #[test]
    fn performance_preference_forces_server_side() {
        let small = analysis(3, 0.5);
        let d = choose(&small, Some(MethodPreference::Performance));
        assert_eq!(d.method, CompressionMethod::ServerSide);
    }

    #[test]
    fn large_file_goes_server_side() {
        let d = choose(&analysis(10, 80.0), None);
        assert_eq!(d.method, CompressionMethod::ServerSide);
        assert!(d.reason.contains("Large file"), "reason was: {}", d.reason);
    }

    #[test]
    fn page_count_edge_is_exclusive() {
        // 100 pages is NOT "high page count"; 101 is.
        let at_edge = choose(&analysis(100, 1.0), None);
        assert!(!at_edge.reason.contains("High page count"));

        let over_edge = choose(&analysis(101, 1.0), None);
        assert_eq!(over_edge.method, CompressionMethod::ServerSide);
        assert!(over_edge.reason.contains("High page count"));
    }

    #[test]
    fn size_edge_is_exclusive() {
        // Exactly 50 MB does not trip the large-file rule.
        let d = choose(&analysis(10, 50.0), None);
        assert!(!d.reason.contains("Large file"));
    }

    #[test]
    fn text_heavy_long_document_goes_server_side() {
        let mut a = analysis(60, 2.0);
        a.is_text_heavy = true;
        let d = choose(&a, None);
        assert_eq!(d.method, CompressionMethod::ServerSide);
        assert!(d.reason.contains("searchability"));
    }

    #[test]
    fn image_heavy_document_stays_local() {
        let mut a = analysis(5, 2.0);
        a.is_image_heavy = true;
        a.complexity = Complexity::High;
        let d = choose(&a, None);
        assert_eq!(d.method, CompressionMethod::ClientSide);
    }

    #[test]
    fn small_file_stays_local() {
        let d = choose(&analysis(10, 1.0), None);
        assert_eq!(d.method, CompressionMethod::ClientSide);
    }

    #[test]
    fn mixed_default_goes_server_side() {
        // 60 pages / 20 MB: no rule before the default matches
        let d = choose(&analysis(60, 20.0), None);
        assert_eq!(d.method, CompressionMethod::ServerSide);
    }

    #[test]
    fn choice_is_deterministic() {
        let a = analysis(42, 7.5);
        let first = choose(&a, None);
        let second = choose(&a, None);
        assert_eq!(first.method, second.method);
        assert_eq!(first.reason, second.reason);
        assert_eq!(first.estimated_time, second.estimated_time);
    }

    #[test]
    fn estimates_scale_with_method_and_pages() {
        let a = analysis(10, 2.0);
        // 10 medium pages: client 15s, server 2s + 5s overhead
        assert_eq!(estimate_time(&a, CompressionMethod::ClientSide), "~15s");
        assert_eq!(estimate_time(&a, CompressionMethod::ServerSide), "~7s");

        let long = FileAnalysis {
            pages: 900,
            size_mb: 40.0,
            is_image_heavy: true,
            is_text_heavy: false,
            complexity: Complexity::High,
        };
        // 900 * 3.0s = 45 min
        assert_eq!(estimate_time(&long, CompressionMethod::ClientSide), "~45 min");
    }

    #[test]
    fn durations_round_up_into_hours() {
        let huge = FileAnalysis {
            pages: 2000,
            size_mb: 45.0,
            is_image_heavy: true,
            is_text_heavy: false,
            complexity: Complexity::High,
        };
        // 2000 * 3.0s = 100 min -> 2 h rounded up
        assert_eq!(estimate_time(&huge, CompressionMethod::ClientSide), "~2 h");
    }

    #[test]
    fn validation_rejects_oversized_client_side() {
        let a = analysis(10, 150.0);
        let v = validate(&a, CompressionMethod::ClientSide);
        assert!(!v.valid);

        let v = validate(&a, CompressionMethod::ServerSide);
        assert!(v.valid);
        assert!(v.warning.is_none());
    }

    #[test]
    fn validation_warns_but_allows_borderline_client_side() {
        let many_pages = analysis(2500, 30.0);
        let v = validate(&many_pages, CompressionMethod::ClientSide);
        assert!(v.valid);
        assert!(v.warning.is_some());

        let large = analysis(100, 60.0);
        let v = validate(&large, CompressionMethod::ClientSide);
        assert!(v.valid);
        assert!(v.warning.is_some());
    }

    #[test]
    fn validation_rejects_oversized_server_side() {
        let a = analysis(10, 600.0);
        let v = validate(&a, CompressionMethod::ServerSide);
        assert!(!v.valid);
    }

    #[test]
    fn decision_serializes_for_callers() {
        let d = choose(&analysis(5, 1.0), None);
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"method\""));
        assert!(json.contains("ClientSide"));
    }
}
