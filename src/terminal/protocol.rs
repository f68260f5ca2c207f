/* The tiny line-oriented wire protocol spoken by a terminal.
 *
 * All traffic is ASCII, one frame per line, terminated by `\n` (the line
 * terminator itself is stripped/added by the reader/writer, never handled
 * here). This module only deals in already-split lines. */
use std::fmt;

pub const LCD_COLUMNS: usize = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    High,
    Low,
}

impl Tone {
    fn as_char(self) -> char {
        match self {
            Tone::High => 'H',
            Tone::Low => 'L',
        }
    }
}

/* A command the controller sends to a terminal. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /* `n` — request the terminal's self-reported name. */
    Name,
    /* `L<chars>` — set LEDs; `chars` is any subset of `{R,G,B}`. */
    Leds(String),
    /* `T<tone><ms>` — buzz for `ms` milliseconds. */
    Buzz { tone: Tone, ms: u32 },
    /* `M<row><text>` — write LCD row 0 or 1, truncated to 24 columns. */
    Lcd { row: u8, text: String },
}

impl Command {
    pub fn opcode(&self) -> char {
        match self {
            Command::Name => 'n',
            Command::Leds(_) => 'L',
            Command::Buzz { .. } => 'T',
            Command::Lcd { .. } => 'M',
        }
    }

    /* Encode this command as a wire line, without the trailing `\n`. */
    pub fn encode(&self) -> String {
        match self {
            Command::Name => "n".to_string(),
            Command::Leds(chars) => format!("L{chars}"),
            Command::Buzz { tone, ms } => format!("T{}{}", tone.as_char(), ms),
            Command::Lcd { row, text } => {
                let truncated: String = text.chars().take(LCD_COLUMNS).collect();
                format!("M{row}{truncated}")
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/* A spontaneous event emitted by a terminal. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /* `K<c>` — one keypress, `c` in `{0-9,*,#}`. */
    Key(char),
    /* `I<hexid>` — an RFID card is present; re-emitted while present. */
    Rfid(String),
}

/* Classification of one incoming line from a terminal. */
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingLine {
    Event(Event),
    /* Everything that isn't an event: opcode + remaining payload. The
     * driver checks the opcode matches the command it is waiting on. */
    Response { opcode: char, payload: String },
    /* `#`/NUL-prefixed firmware comment or garbage; drop silently. */
    Ignored,
}

pub fn classify_line(line: &str) -> IncomingLine {
    let mut chars = line.chars();
    let Some(first) = chars.next() else {
        return IncomingLine::Ignored;
    };

    if first == '#' || first == '\0' {
        return IncomingLine::Ignored;
    }

    match first {
        'K' => match chars.next() {
            Some(c) => IncomingLine::Event(Event::Key(c)),
            None => IncomingLine::Ignored,
        },
        'I' => IncomingLine::Event(Event::Rfid(chars.collect())),
        other => IncomingLine::Response {
            opcode: other,
            payload: chars.collect(),
        },
    }
}

/* A keypress/RFID char is legal input for code entry. */
pub fn is_code_char(c: char) -> bool {
    c.is_ascii_digit() || c == '*' || c == '#'
}
