//! Parser for the status lines a node prints on its BLE console.

/// Route of one entry in a node list report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// The reporting node itself
    Own,
    Direct,
    Via { first_hop: u32, hops: u8 },
}

/// One parsed console line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleLine {
    /// `<n> nodes in the map`
    NodeCount(usize),
    /// `Node #NN id: XXXXXXXX ...`
    Node { index: usize, id: u32, route: Route },
    /// `Received data package from XXXXXXXX: text`
    Received { from: u32, text: String },
    BroadcastQueued(u32),
    DirectQueued(u32),
    RelayQueued { dest: u32, first_hop: u32 },
    SendFailed,
    /// Mirrored firmware log line, `[LEVEL] message`
    Log { level: String, message: String },
    Other(String),
}

fn hex_id(text: &str) -> Option<u32> {
    if text.len() != 8 {
        return None;
    }
    u32::from_str_radix(text, 16).ok()
}

fn parse_node(rest: &str) -> Option<ConsoleLine> {
    // "#03 id: DEADBEEF first hop 0A0B0C0D #hops 2"
    let rest = rest.strip_prefix('#')?;
    let (index, rest) = rest.split_once(" id: ")?;
    let index = index.parse().ok()?;

    let mut words = rest.split_whitespace();
    let id = hex_id(words.next()?)?;

    let route = match words.next() {
        None => Route::Own,
        Some("direct") => Route::Direct,
        Some("first") => {
            if words.next()? != "hop" {
                return None;
            }
            let first_hop = hex_id(words.next()?)?;
            if words.next()? != "#hops" {
                return None;
            }
            let hops = words.next()?.parse().ok()?;
            Route::Via { first_hop, hops }
        }
        Some(_) => return None,
    };

    Some(ConsoleLine::Node { index, id, route })
}

/// Parse one console line (without the trailing newline).
pub fn parse_line(line: &str) -> ConsoleLine {
    let line = line.trim_end_matches(['\r', '\n']);
    let other = || ConsoleLine::Other(line.to_string());

    if let Some(count) = line.strip_suffix(" nodes in the map") {
        return count.parse().map(ConsoleLine::NodeCount).unwrap_or_else(|_| other());
    }
    if let Some(rest) = line.strip_prefix("Node ") {
        return parse_node(rest).unwrap_or_else(other);
    }
    if let Some(rest) = line.strip_prefix("Received data package from ") {
        return rest
            .split_once(": ")
            .and_then(|(from, text)| {
                Some(ConsoleLine::Received {
                    from: hex_id(from)?,
                    text: text.to_string(),
                })
            })
            .unwrap_or_else(other);
    }
    if let Some(id) = line.strip_prefix("Queuing broadcast with id ") {
        return hex_id(id).map(ConsoleLine::BroadcastQueued).unwrap_or_else(other);
    }
    if let Some(dest) = line.strip_prefix("Queuing msg direct to ") {
        return hex_id(dest).map(ConsoleLine::DirectQueued).unwrap_or_else(other);
    }
    if let Some(rest) = line.strip_prefix("Queuing msg to hop to ") {
        return rest
            .split_once(" over ")
            .and_then(|(dest, hop)| {
                Some(ConsoleLine::RelayQueued {
                    dest: hex_id(dest)?,
                    first_hop: hex_id(hop)?,
                })
            })
            .unwrap_or_else(other);
    }
    if line == "Sending package failed" {
        return ConsoleLine::SendFailed;
    }
    if let Some(rest) = line.strip_prefix('[') {
        if let Some((level, message)) = rest.split_once("] ") {
            return ConsoleLine::Log {
                level: level.to_string(),
                message: message.to_string(),
            };
        }
    }

    other()
}

/// A complete node list report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeList {
    pub own_id: u32,
    /// Known nodes other than the reporting one
    pub entries: Vec<(u32, Route)>,
}

impl NodeList {
    pub fn contains(&self, id: u32) -> bool {
        self.entries.iter().any(|(node, _)| *node == id)
    }
}

/// Collects consecutive console lines into [`NodeList`] reports.
#[derive(Debug, Default)]
pub struct NodeListAssembler {
    expected: usize,
    own_id: Option<u32>,
    entries: Vec<(u32, Route)>,
}

impl NodeListAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line. Returns the list once its last entry arrived.
    pub fn push(&mut self, line: &ConsoleLine) -> Option<NodeList> {
        match *line {
            ConsoleLine::NodeCount(count) => {
                self.expected = count;
                self.own_id = None;
                self.entries.clear();
            }
            ConsoleLine::Node { id, route: Route::Own, .. } if self.expected > 0 => {
                self.own_id = Some(id);
            }
            ConsoleLine::Node { id, route, .. } if self.own_id.is_some() => {
                self.entries.push((id, route));
            }
            // Other output may interleave with a report
            _ => return None,
        }

        let own_id = self.own_id?;
        if self.entries.len() + 1 < self.expected {
            return None;
        }

        self.expected = 0;
        self.own_id = None;
        Some(NodeList {
            own_id,
            entries: std::mem::take(&mut self.entries),
        })
    }
}

/// Node ID encoded in an advertised device name such as `DR-00A1B2C3`.
pub fn node_id_from_name(name: &str) -> Option<u32> {
    hex_id(name.strip_prefix("DR-")?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_node_lines() {
        assert_eq!(
            parse_line("Node #01 id: 12345678"),
            ConsoleLine::Node { index: 1, id: 0x12345678, route: Route::Own }
        );
        assert_eq!(
            parse_line("Node #02 id: 0A0B0C0D direct"),
            ConsoleLine::Node { index: 2, id: 0x0A0B0C0D, route: Route::Direct }
        );
        assert_eq!(
            parse_line("Node #03 id: DEADBEEF first hop 0A0B0C0D #hops 2"),
            ConsoleLine::Node {
                index: 3,
                id: 0xDEADBEEF,
                route: Route::Via { first_hop: 0x0A0B0C0D, hops: 2 }
            }
        );
    }

    #[test]
    fn parses_traffic_lines() {
        assert_eq!(
            parse_line("Received data package from 000000AB: >>000000AB<<\r\n"),
            ConsoleLine::Received { from: 0xAB, text: ">>000000AB<<".to_string() }
        );
        assert_eq!(parse_line("Queuing broadcast with id 00000007"), ConsoleLine::BroadcastQueued(7));
        assert_eq!(parse_line("Queuing msg direct to 00000002"), ConsoleLine::DirectQueued(2));
        assert_eq!(
            parse_line("Queuing msg to hop to 00000003 over 00000002"),
            ConsoleLine::RelayQueued { dest: 3, first_hop: 2 }
        );
        assert_eq!(parse_line("Sending package failed"), ConsoleLine::SendFailed);
    }

    #[test]
    fn parses_log_and_unknown_lines() {
        assert_eq!(
            parse_line("[WARN] No route to 00000009"),
            ConsoleLine::Log { level: "WARN".to_string(), message: "No route to 00000009".to_string() }
        );
        assert_eq!(parse_line("Node #xx id: zz"), ConsoleLine::Other("Node #xx id: zz".to_string()));
        assert_eq!(parse_line("x nodes in the map"), ConsoleLine::Other("x nodes in the map".to_string()));
    }

    #[test]
    fn assembles_node_list() {
        let mut assembler = NodeListAssembler::new();
        let lines = [
            "3 nodes in the map",
            "Node #01 id: 00000001",
            "[WARN] interleaved",
            "Node #02 id: 00000002 direct",
            "Node #03 id: 00000003 first hop 00000002 #hops 1",
        ];

        let mut lists: Vec<_> = lines.iter().filter_map(|l| assembler.push(&parse_line(l))).collect();
        assert_eq!(lists.len(), 1);

        let list = lists.remove(0);
        assert_eq!(list.own_id, 1);
        assert!(list.contains(2));
        assert!(list.contains(3));
        assert!(!list.contains(1));
    }

    #[test]
    fn assembles_lonely_node() {
        let mut assembler = NodeListAssembler::new();
        assert_eq!(assembler.push(&parse_line("1 nodes in the map")), None);

        let list = assembler.push(&parse_line("Node #01 id: 00000001")).unwrap();
        assert!(list.entries.is_empty());
    }

    #[test]
    fn restarts_on_new_report() {
        let mut assembler = NodeListAssembler::new();
        assembler.push(&parse_line("3 nodes in the map"));
        assembler.push(&parse_line("Node #01 id: 00000001"));

        assembler.push(&parse_line("2 nodes in the map"));
        assembler.push(&parse_line("Node #01 id: 00000001"));
        let list = assembler.push(&parse_line("Node #02 id: 00000005 direct")).unwrap();
        assert_eq!(list.entries, vec![(5, Route::Direct)]);
    }

    #[test]
    fn reads_node_id_from_name() {
        assert_eq!(node_id_from_name("DR-00A1B2C3"), Some(0x00A1B2C3));
        assert_eq!(node_id_from_name("WalkieTextie-AABBCC"), None);
    }
}
