// Copyright (c) 2025 dubrs contributors
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use std::fmt::Write as _;

/// 将 WEBVTT 字幕转换为 SRT
///
/// 时间戳的毫秒分隔符由 `.` 改写为 `,`，cue 重新从 1 编号；
/// WEBVTT 头、NOTE 块与 cue 标识行被跳过，仅收集时间戳之后的文本行
pub fn vtt_to_srt(vtt: &str) -> String {
    struct Cue {
        start: String,
        end: String,
        lines: Vec<String>,
    }

    let mut cues: Vec<Cue> = Vec::new();
    let mut pending: Vec<String> = Vec::new();
    let mut start = String::new();
    let mut end = String::new();

    fn flush(cues: &mut Vec<Cue>, pending: &mut Vec<String>, start: &mut String, end: &mut String) {
        if !start.is_empty() && !end.is_empty() && !pending.is_empty() {
            cues.push(Cue {
                start: std::mem::take(start),
                end: std::mem::take(end),
                lines: std::mem::take(pending),
            });
        } else {
            pending.clear();
            start.clear();
            end.clear();
        }
    }

    for raw_line in vtt.lines() {
        let line = raw_line.trim_end_matches('\r');
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush(&mut cues, &mut pending, &mut start, &mut end);
            continue;
        }
        if trimmed.eq_ignore_ascii_case("WEBVTT") || trimmed.starts_with("NOTE") {
            continue;
        }

        if let Some((from, to)) = parse_timestamp_line(trimmed) {
            flush(&mut cues, &mut pending, &mut start, &mut end);
            start = from.replace('.', ",");
            end = to.replace('.', ",");
            continue;
        }

        // cue 标识行出现在时间戳之前，此时 start/end 为空，直接跳过
        if start.is_empty() || end.is_empty() {
            continue;
        }
        pending.push(line.to_string());
    }
    flush(&mut cues, &mut pending, &mut start, &mut end);

    let mut out = String::new();
    for (i, cue) in cues.iter().enumerate() {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(out, "{} --> {}", cue.start, cue.end);
        for line in &cue.lines {
            let _ = writeln!(out, "{line}");
        }
        out.push('\n');
    }
    out
}

/// 解析 `HH:MM:SS.mmm --> HH:MM:SS.mmm` 行
fn parse_timestamp_line(line: &str) -> Option<(String, String)> {
    let (left, right) = line.split_once("-->")?;
    let from = left.trim();
    let to = right.trim().split_whitespace().next()?;
    if is_vtt_timestamp(from) && is_vtt_timestamp(to) {
        Some((from.to_string(), to.to_string()))
    } else {
        None
    }
}

fn is_vtt_timestamp(s: &str) -> bool {
    // HH:MM:SS.mmm
    let bytes = s.as_bytes();
    if bytes.len() != 12 {
        return false;
    }
    for (i, b) in bytes.iter().enumerate() {
        let ok = match i {
            2 | 5 => *b == b':',
            8 => *b == b'.',
            _ => b.is_ascii_digit(),
        };
        if !ok {
            return false;
        }
    }
    true
}
