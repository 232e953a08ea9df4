//! Human readable rendering of a proof

use std::fmt::Write;

use ots_core::{DetachedTimestampFile, Timestamp};
use ots_types::Attestation;

/// Render `file` as an indented tree of operations and attestations.
///
/// With `show_messages`, every edge is followed by the message it yields.
pub fn render(file: &DetachedTimestampFile, show_messages: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "File {} hash: {}",
        file.hash_algorithm(),
        hex::encode(file.file_digest())
    );
    let _ = writeln!(out, "Timestamp:");
    render_tree(file.timestamp(), 0, show_messages, &mut out);
    out
}

fn render_tree(node: &Timestamp, indent: usize, show_messages: bool, out: &mut String) {
    let pad = " ".repeat(indent);
    for attestation in node.attestations() {
        let _ = writeln!(out, "{}verify {}", pad, attestation);
        if let Attestation::Blockchain { chain, .. } = attestation {
            let mut root = node.msg().to_vec();
            root.reverse();
            let _ = writeln!(out, "{}# {} block merkle root {}", pad, chain, hex::encode(root));
        }
    }

    let suffix = |child: &Timestamp| {
        if show_messages {
            format!(" == {}", hex::encode(child.msg()))
        } else {
            String::new()
        }
    };

    if node.ops().len() > 1 {
        for (op, child) in node.ops() {
            let _ = writeln!(out, "{} -> {}{}", pad, op, suffix(child));
            render_tree(child, indent + 4, show_messages, out);
        }
    } else if let Some((op, child)) = node.ops().iter().next() {
        let _ = writeln!(out, "{}{}{}", pad, op, suffix(child));
        render_tree(child, indent, show_messages, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ots_types::{HashAlgorithm, Op};

    #[test]
    fn test_render_linear() {
        let mut file = DetachedTimestampFile::hash_data(HashAlgorithm::Sha256, b"Hello World!\n");
        file.timestamp_mut()
            .add_op(Op::Append(vec![0xab]))
            .unwrap()
            .add_op(Op::sha256())
            .unwrap()
            .add_attestation(Attestation::bitcoin(358391));

        let text = render(&file, false);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines[0],
            "File sha256 hash: 03ba204e50d126e4674c005e04d82e84c21366780af1f43bd54a37816b6ab340"
        );
        assert_eq!(lines[1], "Timestamp:");
        assert_eq!(lines[2], "append ab");
        assert_eq!(lines[3], "sha256");
        assert_eq!(lines[4], "verify BitcoinBlockHeaderAttestation(358391)");
        assert!(lines[5].starts_with("# Bitcoin block merkle root "));
    }

    #[test]
    fn test_render_fork_indents() {
        let mut file = DetachedTimestampFile::hash_data(HashAlgorithm::Sha256, b"data");
        let root = file.timestamp_mut();
        root.add_op(Op::Append(vec![1]))
            .unwrap()
            .add_attestation(Attestation::pending("https://a.example.com").unwrap());
        root.add_op(Op::Append(vec![2]))
            .unwrap()
            .add_attestation(Attestation::pending("https://b.example.com").unwrap());

        let text = render(&file, true);
        assert!(text.contains(" -> append 01 == "));
        assert!(text.contains("    verify PendingAttestation('https://a.example.com')"));
        assert!(text.contains("    verify PendingAttestation('https://b.example.com')"));
    }
}
