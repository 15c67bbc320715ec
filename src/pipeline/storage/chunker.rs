use super::types::{Chunker, TextChunk};

/// Passage chunker for knowledge base documents (Markdown or plain text).
///
/// Headings start a new section; sections never share a passage. Paragraphs
/// are packed greedily up to `max_chunk_chars`; an oversized paragraph is
/// split into sentences (`.`, `?`, `!`, `।`) and an oversized sentence is
/// hard-wrapped. Consecutive passages of a section repeat up to
/// `overlap_chars` of trailing text. Sizes are in bytes.
pub struct PassageChunker {
    max_chunk_chars: usize,
    min_chunk_chars: usize,
    overlap_chars: usize,
}

impl PassageChunker {
    pub fn new() -> Self {
        Self {
            max_chunk_chars: 1000,
            min_chunk_chars: 20,
            overlap_chars: 100,
        }
    }

    pub fn with_limits(max_chunk_chars: usize, overlap_chars: usize) -> Self {
        let max_chunk_chars = max_chunk_chars.max(50);
        Self {
            max_chunk_chars,
            min_chunk_chars: 20,
            overlap_chars: overlap_chars.min(max_chunk_chars / 2),
        }
    }

    fn pieces<'t>(&self, para: &Paragraph<'t>, out: &mut Vec<Piece<'t>>) {
        if para.text.len() <= self.max_chunk_chars {
            out.push(Piece {
                offset: para.offset,
                text: para.text,
                joiner: "\n\n",
            });
            return;
        }

        let mut joiner = "\n\n";
        for (offset, sentence) in sentence_spans(para.text) {
            let offset = para.offset + offset;
            if sentence.len() <= self.max_chunk_chars {
                out.push(Piece {
                    offset,
                    text: sentence,
                    joiner,
                });
            } else {
                for (i, (wrap_offset, part)) in
                    hard_wrap(sentence, self.max_chunk_chars).into_iter().enumerate()
                {
                    out.push(Piece {
                        offset: offset + wrap_offset,
                        text: part,
                        joiner: if i == 0 { joiner } else { "" },
                    });
                }
            }
            joiner = " ";
        }
    }
}

impl Default for PassageChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl Chunker for PassageChunker {
    fn chunk(&self, text: &str) -> Vec<TextChunk> {
        let mut packer = Packer::new(self.max_chunk_chars, self.overlap_chars);
        let mut pieces = Vec::new();
        let mut section = 0;

        for para in paragraphs(text) {
            if para.section != section {
                packer.end_section();
                section = para.section;
                packer.title = para.title.map(String::from);
            }
            pieces.clear();
            self.pieces(&para, &mut pieces);
            for piece in pieces.drain(..) {
                packer.push(piece);
            }
        }
        packer.end_section();

        let mut chunks = packer.out;
        merge_tiny_chunks(&mut chunks, self.min_chunk_chars);
        chunks
    }
}

// ═══════════════════════════════════════════════════════════
// Paragraph scanning
// ═══════════════════════════════════════════════════════════

/// A run of non-blank lines, as a slice of the source text.
struct Paragraph<'t> {
    /// Headings seen before this paragraph.
    section: usize,
    title: Option<&'t str>,
    offset: usize,
    text: &'t str,
}

fn is_heading(line: &str) -> bool {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && line[hashes..].starts_with(' ')
}

fn paragraphs(text: &str) -> Vec<Paragraph<'_>> {
    let mut out = Vec::new();
    let mut title: Option<&str> = None;
    let mut section = 0;
    let mut open: Option<(usize, usize)> = None;
    let mut pos = 0;

    for line in text.split_inclusive('\n') {
        let start = pos;
        pos += line.len();
        let content = line.trim_end_matches(&['\n', '\r'][..]);

        if is_heading(content) {
            close_paragraph(&mut out, text, &mut open, section, title);
            section += 1;
            title = Some(content.trim_start_matches('#').trim());
        } else if content.trim().is_empty() {
            close_paragraph(&mut out, text, &mut open, section, title);
        } else {
            let end = start + content.trim_end().len();
            match &mut open {
                Some((_, para_end)) => *para_end = end,
                None => {
                    let lead = content.len() - content.trim_start().len();
                    open = Some((start + lead, end));
                }
            }
        }
    }
    close_paragraph(&mut out, text, &mut open, section, title);

    out
}

fn close_paragraph<'t>(
    out: &mut Vec<Paragraph<'t>>,
    text: &'t str,
    open: &mut Option<(usize, usize)>,
    section: usize,
    title: Option<&'t str>,
) {
    if let Some((start, end)) = open.take() {
        out.push(Paragraph {
            section,
            title,
            offset: start,
            text: &text[start..end],
        });
    }
}

/// Sentences with their byte offsets. A terminator must be followed by
/// whitespace to end a sentence ("3.5 g" stays whole).
fn sentence_spans(text: &str) -> Vec<(usize, &str)> {
    let mut spans = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((_, c)) = chars.next() {
        if !matches!(c, '.' | '?' | '!' | '।') {
            continue;
        }
        if let Some(&(next, after)) = chars.peek() {
            if after.is_whitespace() {
                push_trimmed(&mut spans, text, start, next);
                start = next;
            }
        }
    }
    push_trimmed(&mut spans, text, start, text.len());

    spans
}

fn push_trimmed<'t>(spans: &mut Vec<(usize, &'t str)>, text: &'t str, from: usize, to: usize) {
    let raw = &text[from..to];
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
        spans.push((from + raw.len() - raw.trim_start().len(), trimmed));
    }
}

/// Largest char boundary `<= idx`.
fn floor_boundary(s: &str, idx: usize) -> usize {
    if idx >= s.len() {
        return s.len();
    }
    let mut i = idx;
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Split at char boundaries into windows of at most `max` bytes.
fn hard_wrap(text: &str, max: usize) -> Vec<(usize, &str)> {
    let mut parts = Vec::new();
    let mut start = 0;
    while start < text.len() {
        let mut end = floor_boundary(text, start + max);
        if end <= start {
            // A single char wider than the window
            end = text[start..]
                .char_indices()
                .nth(1)
                .map_or(text.len(), |(i, _)| start + i);
        }
        parts.push((start, &text[start..end]));
        start = end;
    }
    parts
}

// ═══════════════════════════════════════════════════════════
// Packing
// ═══════════════════════════════════════════════════════════

struct Piece<'t> {
    offset: usize,
    text: &'t str,
    /// Separator placed before this piece when it follows another.
    joiner: &'static str,
}

struct Packer<'t> {
    max: usize,
    overlap: usize,
    title: Option<String>,
    parts: Vec<Piece<'t>>,
    out: Vec<TextChunk>,
}

impl<'t> Packer<'t> {
    fn new(max: usize, overlap: usize) -> Self {
        Self {
            max,
            overlap,
            title: None,
            parts: Vec::new(),
            out: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.parts
            .iter()
            .enumerate()
            .map(|(i, p)| p.text.len() + if i == 0 { 0 } else { p.joiner.len() })
            .sum()
    }

    fn push(&mut self, piece: Piece<'t>) {
        if !self.parts.is_empty() && self.len() + piece.joiner.len() + piece.text.len() > self.max {
            self.emit();
            self.keep_overlap();
            if !self.parts.is_empty()
                && self.len() + piece.joiner.len() + piece.text.len() > self.max
            {
                self.parts.clear();
            }
        }
        self.parts.push(piece);
    }

    fn emit(&mut self) {
        let Some(first) = self.parts.first() else {
            return;
        };
        let mut content = String::with_capacity(self.len());
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 {
                content.push_str(part.joiner);
            }
            content.push_str(part.text);
        }
        self.out.push(TextChunk {
            content,
            chunk_index: self.out.len(),
            section_title: self.title.clone(),
            char_offset: first.offset,
        });
    }

    /// Keep the longest proper suffix of pieces that fits in the overlap.
    fn keep_overlap(&mut self) {
        let mut kept = 0;
        let mut size = 0;
        let mut joiner_after = 0;
        for part in self.parts.iter().skip(1).rev() {
            let next = size + part.text.len() + joiner_after;
            if next > self.overlap {
                break;
            }
            size = next;
            joiner_after = part.joiner.len();
            kept += 1;
        }
        let drop_count = self.parts.len() - kept;
        self.parts.drain(..drop_count);
    }

    fn end_section(&mut self) {
        self.emit();
        self.parts.clear();
    }
}

/// Fold passages shorter than `min_chars` into their neighbour, then renumber.
fn merge_tiny_chunks(chunks: &mut Vec<TextChunk>, min_chars: usize) {
    let mut i = 0;
    while i < chunks.len() {
        if chunks[i].content.len() >= min_chars || chunks.len() == 1 {
            i += 1;
            continue;
        }
        if i + 1 < chunks.len() {
            let next = chunks.remove(i + 1);
            chunks[i].content.push_str("\n\n");
            chunks[i].content.push_str(&next.content);
        } else {
            let tail = chunks.remove(i);
            chunks[i - 1].content.push_str("\n\n");
            chunks[i - 1].content.push_str(&tail.content);
        }
    }
    for (i, chunk) in chunks.iter_mut().enumerate() {
        chunk.chunk_index = i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunks_by_headings() {
        let md = "## Tulsi\n\nHoly basil leaves are boiled in water and taken for cough and cold.\n\n## Neem\n\nNeem leaf paste is applied on the skin for itching and minor infections.\n\n## Turmeric\n\nTurmeric in warm milk is a common home remedy for sore throat.";
        let chunks = PassageChunker::new().chunk(md);

        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].section_title.as_deref(), Some("Tulsi"));
        assert_eq!(chunks[1].section_title.as_deref(), Some("Neem"));
        assert_eq!(chunks[2].section_title.as_deref(), Some("Turmeric"));
        assert!(chunks[0].content.starts_with("Holy basil"));
    }

    #[test]
    fn paragraphs_of_a_section_share_a_passage() {
        let md = "# Digestion\n\nGinger tea after meals helps with indigestion.\n\nFennel seeds are chewed to reduce bloating.\n\n# Sleep\n\nWarm milk with nutmeg before bed is used for mild insomnia.";
        let chunks = PassageChunker::new().chunk(md);
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].content,
            "Ginger tea after meals helps with indigestion.\n\nFennel seeds are chewed to reduce bloating."
        );
        assert_eq!(chunks[1].section_title.as_deref(), Some("Sleep"));
    }

    #[test]
    fn repeated_heading_titles_stay_separate() {
        let md = "## Dosage\n\nTwo leaves in the morning on an empty stomach.\n\n## Dosage\n\nOne spoon of powder with warm water at night.";
        let chunks = PassageChunker::new().chunk(md);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.section_title.as_deref() == Some("Dosage")));
    }

    #[test]
    fn hashtag_without_space_is_not_a_heading() {
        assert!(!is_heading("#ayurveda is old"));
        assert!(!is_heading("####### seven"));
        assert!(is_heading("### Dosage"));
    }

    #[test]
    fn splits_large_sections_with_overlap() {
        let large = "## Remedies\n\n".to_string()
            + &"Take one spoon of honey with ginger juice. ".repeat(200);
        let chunks = PassageChunker::new().chunk(&large);

        assert!(chunks.len() > 1, "Large section should be split into multiple chunks");
        for chunk in &chunks {
            assert!(chunk.content.len() <= 1000, "Chunk too large: {}", chunk.content.len());
            assert_eq!(chunk.section_title.as_deref(), Some("Remedies"));
        }
        let tail_of_first = &chunks[0].content[chunks[0].content.len() - 42..];
        assert!(chunks[1].content.starts_with(tail_of_first));
    }

    #[test]
    fn multibyte_text_splits_on_danda() {
        let text = "तुलसी के पत्ते खांसी में उपयोगी हैं। ".repeat(150);
        let chunks = PassageChunker::new().chunk(&text);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.content.ends_with('।'));
            assert!(chunk.content.len() <= 1000);
        }
    }

    #[test]
    fn unbroken_text_is_hard_wrapped() {
        // 2700 bytes: windows of 999 (char boundary), 999, 702
        let text = "अ".repeat(900);
        let chunks = PassageChunker::new().chunk(&text);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].content.len(), 999);
        assert_eq!(chunks.iter().map(|c| c.content.len()).sum::<usize>(), 2700);
    }

    #[test]
    fn decimal_points_do_not_end_sentences() {
        let spans = sentence_spans("Take 2.5 g daily. Stop after 3 days.");
        assert_eq!(
            spans,
            vec![(0, "Take 2.5 g daily."), (18, "Stop after 3 days.")]
        );
    }

    #[test]
    fn merges_tiny_sections() {
        let md = "## A\n\nShort.\n\n## B\n\nAlso ok but slightly longer content here to test merging of tiny sections with enough text.";
        let chunks = PassageChunker::new().chunk(md);

        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].section_title.as_deref(), Some("A"));
        assert!(chunks[0].content.starts_with("Short.\n\nAlso ok"));
    }

    #[test]
    fn trailing_tiny_chunk_merges_backwards() {
        let md = "## A\n\nSection A has enough content to be a chunk.\n\n## B\n\nTiny.";
        let chunks = PassageChunker::new().chunk(md);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.ends_with("\n\nTiny."));
    }

    #[test]
    fn chunk_indices_are_contiguous() {
        let md = "## A\n\nShort.\n\n## B\n\nSection B has enough content to be a chunk.\n\n## C\n\nSection C also has enough content to be a chunk.";
        let chunks = PassageChunker::new().chunk(md);

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.chunk_index, i, "Chunk index mismatch");
        }
    }

    #[test]
    fn empty_text_returns_empty() {
        assert!(PassageChunker::new().chunk("").is_empty());
        assert!(PassageChunker::new().chunk("  \n\n ").is_empty());
        assert!(PassageChunker::new().chunk("## Only a heading\n").is_empty());
    }

    #[test]
    fn plain_text_single_chunk() {
        let text = "Amla is rich in vitamin C. The fruit is eaten raw or as juice to support immunity.";
        let chunks = PassageChunker::new().chunk(text);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].content, text);
        assert!(chunks[0].section_title.is_none());
    }

    #[test]
    fn char_offset_points_into_source() {
        let md = "## First\n\nContent of first section with enough detail to exceed minimum.\n\n## Second\n\r\n  Content of second section which is also long enough for chunking.";
        let chunks = PassageChunker::new().chunk(md);

        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(md[chunk.char_offset..].starts_with(&chunk.content));
        }
    }

    #[test]
    fn custom_limits_produce_smaller_chunks() {
        let text = "Sentence about remedies and dosage. ".repeat(40);
        let chunks = PassageChunker::with_limits(200, 20).chunk(&text);
        assert!(chunks.len() > 3);
        assert!(chunks.iter().all(|c| c.content.len() <= 200));
    }
}
