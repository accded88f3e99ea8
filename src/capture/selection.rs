use super::host::VideoDeviceInfo;
use tracing::debug;

/// Label fragments marking a forward-facing sensor, across the locales the
/// booth ships in.
const FRONT_MARKERS: &[&str] = &[
    "front",
    "user",
    "facetime",
    "selfie",
    "avant",
    "frontale",
    "frontal",
    "delantera",
    "vorder",
    "前面",
];

/// Fragments excluding a device even when a front marker matched, since
/// some hardware reports ambiguous combined labels.
const BACK_MARKERS: &[&str] = &[
    "back",
    "rear",
    "environment",
    "arrière",
    "arriere",
    "trasera",
    "rück",
    "rueck",
    "後面",
];

/// Fragments marking a wide/ultra-wide sensor, which distorts faces and is
/// deprioritized when a standard sensor is also available.
const WIDE_MARKERS: &[&str] = &["wide", "ultra", "grand angle", "angular", "0.5"];

fn contains_any(label: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| label.contains(m))
}

fn is_front(label: &str) -> bool {
    contains_any(label, FRONT_MARKERS) && !contains_any(label, BACK_MARKERS)
}

fn is_wide(label: &str) -> bool {
    contains_any(label, WIDE_MARKERS)
}

/// Pick the front-facing device to record with, or `None` when labels give
/// nothing to go on (the caller then falls back to the generic
/// front-facing hint).
///
/// Among several front candidates the standard field-of-view sensor wins
/// over wide/ultra-wide ones; a lone front candidate wins regardless of
/// any wide terms in its label.
pub fn select_front_device(devices: &[VideoDeviceInfo]) -> Option<String> {
    let fronts: Vec<&VideoDeviceInfo> = devices
        .iter()
        .filter(|d| is_front(&d.label.to_lowercase()))
        .collect();

    let selected = match fronts.len() {
        0 => None,
        1 => Some(fronts[0]),
        _ => fronts
            .iter()
            .find(|d| !is_wide(&d.label.to_lowercase()))
            .copied()
            .or_else(|| fronts.first().copied()),
    };

    if let Some(device) = selected {
        debug!(
            "Selected front device '{}' ({}) among {} candidate(s)",
            device.label,
            device.id,
            fronts.len()
        );
    }

    selected.map(|d| d.id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev(id: &str, label: &str) -> VideoDeviceInfo {
        VideoDeviceInfo::new(id, label)
    }

    #[test]
    fn test_no_labels_yields_none() {
        let devices = vec![dev("0", ""), dev("1", "")];
        assert_eq!(select_front_device(&devices), None);
    }

    #[test]
    fn test_single_front_selected() {
        let devices = vec![dev("b", "Back Camera"), dev("f", "Front Camera")];
        assert_eq!(select_front_device(&devices), Some("f".to_string()));
    }

    #[test]
    fn test_single_front_wins_even_when_wide() {
        // a lone front candidate is selected regardless of wide terms
        let devices = vec![
            dev("b", "Back Ultra Wide Camera"),
            dev("f", "Front Ultra Wide Camera"),
        ];
        assert_eq!(select_front_device(&devices), Some("f".to_string()));
    }

    #[test]
    fn test_two_fronts_prefers_non_wide() {
        let devices = vec![
            dev("w", "Front Ultra Wide Camera"),
            dev("s", "Front Camera"),
        ];
        assert_eq!(select_front_device(&devices), Some("s".to_string()));

        // order must not matter
        let devices = vec![
            dev("s", "Front Camera"),
            dev("w", "Front Ultra Wide Camera"),
        ];
        assert_eq!(select_front_device(&devices), Some("s".to_string()));
    }

    #[test]
    fn test_all_fronts_wide_picks_first() {
        let devices = vec![
            dev("w1", "Front Wide Camera"),
            dev("w2", "Front Ultra Wide Camera"),
        ];
        assert_eq!(select_front_device(&devices), Some("w1".to_string()));
    }

    #[test]
    fn test_localized_labels() {
        let devices = vec![
            dev("b", "Caméra arrière"),
            dev("f", "Caméra avant"),
        ];
        assert_eq!(select_front_device(&devices), Some("f".to_string()));

        let devices = vec![
            dev("w", "Cámara delantera gran angular"),
            dev("s", "Cámara delantera"),
        ];
        assert_eq!(select_front_device(&devices), Some("s".to_string()));
    }

    #[test]
    fn test_ambiguous_front_back_label_excluded() {
        // "front" appearing inside a rear-ish label must not count
        let devices = vec![dev("x", "Back camera (front door)")];
        assert_eq!(select_front_device(&devices), None);
    }
}
