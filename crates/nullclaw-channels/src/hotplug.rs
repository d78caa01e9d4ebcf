//! Parses UDEV event log blocks emitted by `udevadm monitor --udev --property`
//! style output into structured [`DeviceEvent`]s. `KERNEL` header lines (the
//! kernel-side echo of the same event) are ignored; only `UDEV` lines carry
//! the settled, userspace-visible event.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Add,
    Remove,
    Change,
}

impl DeviceAction {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "add" => Some(Self::Add),
            "remove" => Some(Self::Remove),
            "change" => Some(Self::Change),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceEvent {
    pub action: DeviceAction,
    pub kind: String,
    pub device_id: String,
    pub timestamp_sec: f64_bits::F64Bits,
}

/// `f64` has no `Eq`; this newtype stores the bit pattern so [`DeviceEvent`]
/// can derive equality for tests while still exposing the float to callers.
pub mod f64_bits {
    #[derive(Debug, Clone, Copy)]
    pub struct F64Bits(u64);

    impl F64Bits {
        pub fn new(v: f64) -> Self {
            Self(v.to_bits())
        }

        pub fn get(&self) -> f64 {
            f64::from_bits(self.0)
        }
    }

    impl PartialEq for F64Bits {
        fn eq(&self, other: &Self) -> bool {
            self.0 == other.0
        }
    }
    impl Eq for F64Bits {}
}

/// Parse every `UDEV [...] (action) device (subsystem)` block found in `log`,
/// each followed by `KEY=VALUE` property lines and terminated by a blank
/// line. Blocks headed by `KERNEL` are skipped. Unknown action keywords drop
/// the whole block.
pub fn parse_udev_log(log: &str) -> Vec<DeviceEvent> {
    let mut events = Vec::new();
    let mut lines = log.lines().peekable();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("KERNEL") {
            continue;
        }
        let Some(header) = parse_header(trimmed) else {
            continue;
        };

        let mut props: HashMap<String, String> = HashMap::new();
        for prop_line in lines.by_ref() {
            if prop_line.trim().is_empty() {
                break;
            }
            if let Some((key, value)) = prop_line.split_once('=') {
                props.insert(key.trim().to_string(), value.trim().to_string());
            }
        }

        let device_id = compose_device_id(&props, &header.device_path);
        events.push(DeviceEvent {
            action: header.action,
            kind: header.subsystem,
            device_id,
            timestamp_sec: f64_bits::F64Bits::new(header.timestamp_sec),
        });
    }

    events
}

struct Header {
    timestamp_sec: f64,
    action: DeviceAction,
    subsystem: String,
    device_path: String,
}

/// `UDEV  [1234.567890] add      /devices/.../usb1/1-1 (usb)`
fn parse_header(line: &str) -> Option<Header> {
    let rest = line.strip_prefix("UDEV")?.trim_start();
    let rest = rest.strip_prefix('[')?;
    let (ts_str, rest) = rest.split_once(']')?;
    let timestamp_sec: f64 = ts_str.trim().parse().ok()?;

    let rest = rest.trim_start();
    let (action_str, rest) = rest.split_once(char::is_whitespace)?;
    let action = DeviceAction::parse(action_str.trim())?;

    let rest = rest.trim();
    let (device_path, subsystem) = match rest.rsplit_once('(') {
        Some((path, tail)) => (
            path.trim().to_string(),
            tail.strip_suffix(')').unwrap_or("unknown").to_string(),
        ),
        None => (rest.to_string(), "unknown".to_string()),
    };

    Some(Header {
        timestamp_sec,
        action,
        subsystem,
        device_path,
    })
}

/// `"<VID>:<PID> <MODEL>"` when `ID_VENDOR_ID` is present, substituting
/// `0000` for a missing product id (`ID_MODEL_ID` or `ID_PRODUCT_ID`) or
/// model name. When the vendor id itself is absent there is nothing to key
/// the composed form on, so the block's raw device path stands in instead.
fn compose_device_id(props: &HashMap<String, String>, device_path: &str) -> String {
    let Some(vid) = props.get("ID_VENDOR_ID") else {
        return device_path.to_string();
    };
    let pid = props
        .get("ID_MODEL_ID")
        .or_else(|| props.get("ID_PRODUCT_ID"))
        .map(String::as_str)
        .unwrap_or("0000");
    let model = props.get("ID_MODEL").map(String::as_str).unwrap_or("0000");
    format!("{vid}:{pid} {model}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_add_event() {
        let log = "UDEV  [1234.567890] add      /devices/pci0000:00/usb1/1-1 (usb)\n\
ID_VENDOR_ID=046d\n\
ID_MODEL_ID=c52b\n\
ID_MODEL=USB_Receiver\n\
\n";
        let events = parse_udev_log(log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].action, DeviceAction::Add);
        assert_eq!(events[0].kind, "usb");
        assert_eq!(events[0].device_id, "046d:c52b USB_Receiver");
        assert!((events[0].timestamp_sec.get() - 1234.567890).abs() < 1e-6);
    }

    #[test]
    fn missing_vendor_id_substitutes_raw_device_path() {
        let log = "UDEV  [1.0] remove   /devices/virtual/input/input9 (input)\n\n";
        let events = parse_udev_log(log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].device_id, "/devices/virtual/input/input9");
    }

    #[test]
    fn missing_product_id_substitutes_zero_placeholder() {
        let log = "UDEV  [1.0] add      /devices/pci0000:00/usb1/1-1 (usb)\n\
ID_VENDOR_ID=1234\n\
ID_MODEL=Widget\n\
\n";
        let events = parse_udev_log(log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].device_id, "1234:0000 Widget");
    }

    #[test]
    fn kernel_header_lines_are_ignored() {
        let log = "KERNEL[1234.0] add      /devices/pci0000:00/usb1/1-1 (usb)\n\
ID_VENDOR_ID=1111\n\
\n\
UDEV  [1234.1] add      /devices/pci0000:00/usb1/1-1 (usb)\n\
ID_VENDOR_ID=2222\n\
ID_MODEL_ID=3333\n\
ID_MODEL=Widget\n\
\n";
        let events = parse_udev_log(log);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].device_id, "2222:3333 Widget");
    }

    #[test]
    fn unknown_action_keyword_drops_block() {
        let log = "UDEV  [2.0] bind      /devices/x (usb)\nID_VENDOR_ID=aaaa\n\n";
        let events = parse_udev_log(log);
        assert!(events.is_empty());
    }

    #[test]
    fn multiple_blocks_parse_independently() {
        let log = "UDEV  [1.0] add      /devices/a (usb)\nID_VENDOR_ID=1111\nID_MODEL_ID=2222\nID_MODEL=A\n\n\
UDEV  [2.0] change   /devices/b (block)\nID_VENDOR_ID=3333\nID_MODEL_ID=4444\nID_MODEL=B\n\n";
        let events = parse_udev_log(log);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].action, DeviceAction::Change);
        assert_eq!(events[1].kind, "block");
    }
}
