//! Value printing: `print`, `println`, `printf` and the default rendering of
//! values into template output.

use serde_json::Value as Json;

use crate::value::Value;

const NIL_ANGLE: &str = "<nil>";

/// Reports whether `c` is printable: a graphic character or ASCII space.
pub fn is_print(c: char) -> bool {
    if c.is_ascii() {
        return (' '..='~').contains(&c);
    }
    !(c.is_control()
        || c.is_whitespace()
        || matches!(c, '\u{AD}' | '\u{200B}'..='\u{200F}' | '\u{2060}'..='\u{206F}' | '\u{FEFF}')
        || ('\u{E000}'..='\u{F8FF}').contains(&c))
}

fn push_escaped(out: &mut String, c: char, quote: char, ascii_only: bool) {
    if c == quote || c == '\\' {
        out.push('\\');
        out.push(c);
        return;
    }
    if ascii_only {
        if c.is_ascii() && is_print(c) {
            out.push(c);
            return;
        }
    } else if is_print(c) {
        out.push(c);
        return;
    }
    match c {
        '\u{07}' => out.push_str("\\a"),
        '\u{08}' => out.push_str("\\b"),
        '\u{0C}' => out.push_str("\\f"),
        '\n' => out.push_str("\\n"),
        '\r' => out.push_str("\\r"),
        '\t' => out.push_str("\\t"),
        '\u{0B}' => out.push_str("\\v"),
        c if (c as u32) < 0x20 || c == '\u{7F}' => out.push_str(&format!("\\x{:02x}", c as u32)),
        c if (c as u32) < 0x10000 => out.push_str(&format!("\\u{:04x}", c as u32)),
        c => out.push_str(&format!("\\U{:08x}", c as u32)),
    }
}

fn quote_with(s: &str, ascii_only: bool) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        push_escaped(&mut out, c, '"', ascii_only);
    }
    out.push('"');
    out
}

/// Double-quoted string literal with Go escapes.
pub fn go_quote(s: &str) -> String {
    quote_with(s, false)
}

fn quote_rune(c: char, ascii_only: bool) -> String {
    let mut out = String::from('\'');
    push_escaped(&mut out, c, '\'', ascii_only);
    out.push('\'');
    out
}

/// `U+0041 'A'` style description of a character.
pub fn go_rune(c: char) -> String {
    if is_print(c) {
        format!("U+{:04X} '{}'", c as u32, c)
    } else {
        format!("U+{:04X}", c as u32)
    }
}

fn can_backquote(s: &str) -> bool {
    s.chars()
        .all(|c| c != '`' && c != '\u{FEFF}' && (c == '\t' || !c.is_control()))
}

/// Decimal digits of a float: value = 0.d1d2d3... * 10^dp.
struct Digits {
    d: Vec<u8>,
    dp: i32,
}

impl Digits {
    fn from_exp_form(s: &str) -> Self {
        let (mant, exp) = s.split_once('e').unwrap_or((s, "0"));
        let exp: i32 = exp.parse().unwrap_or(0);
        let mut d: Vec<u8> = mant.bytes().filter(|b| *b != b'.').collect();
        while d.len() > 1 && d.last() == Some(&b'0') {
            d.pop();
        }
        if d == [b'0'] {
            return Digits { d: Vec::new(), dp: 0 };
        }
        Digits { d, dp: exp + 1 }
    }

    fn shortest(v: f64) -> Self {
        Self::from_exp_form(&format!("{v:e}"))
    }

    fn rounded(v: f64, significant: usize) -> Self {
        Self::from_exp_form(&format!("{:.*e}", significant.saturating_sub(1), v))
    }

    fn nd(&self) -> i32 {
        self.d.len() as i32
    }

    fn fmt_e(&self, out: &mut String, prec: i32, fmt: char) {
        out.push(self.d.first().map_or('0', |c| *c as char));
        if prec > 0 {
            out.push('.');
            let mut i = 1;
            let m = self.nd().min(prec + 1);
            while i < m {
                out.push(self.d[i as usize] as char);
                i += 1;
            }
            while i <= prec {
                out.push('0');
                i += 1;
            }
        }
        out.push(fmt);
        let mut exp = if self.d.is_empty() { 0 } else { self.dp - 1 };
        if exp < 0 {
            out.push('-');
            exp = -exp;
        } else {
            out.push('+');
        }
        if exp < 10 {
            out.push('0');
        }
        out.push_str(&exp.to_string());
    }

    fn fmt_f(&self, out: &mut String, prec: i32) {
        if self.dp > 0 {
            let m = self.nd().min(self.dp);
            out.extend(self.d[..m as usize].iter().map(|c| *c as char));
            for _ in m..self.dp {
                out.push('0');
            }
        } else {
            out.push('0');
        }
        if prec > 0 {
            out.push('.');
            for i in 0..prec {
                let j = self.dp + i;
                let c = if 0 <= j && j < self.nd() {
                    self.d[j as usize] as char
                } else {
                    '0'
                };
                out.push(c);
            }
        }
    }
}

fn float_parts(v: f64) -> (bool, u64, i32) {
    let bits = v.to_bits();
    let neg = bits >> 63 != 0;
    let mut exp = ((bits >> 52) & 0x7ff) as i32;
    let mut mant = bits & ((1u64 << 52) - 1);
    if exp == 0 {
        exp += 1;
    } else {
        mant |= 1 << 52;
    }
    (neg, mant, exp - 1023)
}

fn format_hex_float(v: f64, fmt: char, prec: i32) -> String {
    let (neg, mut mant, mut exp) = float_parts(v);
    if mant == 0 {
        exp = 0;
    }
    mant <<= 60 - 52;
    while mant != 0 && mant & (1 << 60) == 0 {
        mant <<= 1;
        exp -= 1;
    }
    if (0..15).contains(&prec) {
        let shift = (prec * 4) as u32;
        let extra = (mant << shift) & ((1 << 60) - 1);
        mant >>= 60 - shift;
        if extra | (mant & 1) > 1 << 59 {
            mant += 1;
        }
        mant <<= 60 - shift;
        if mant & (1 << 61) != 0 {
            mant >>= 1;
            exp += 1;
        }
    }
    let hex: &[u8; 16] = if fmt == 'X' {
        b"0123456789ABCDEF"
    } else {
        b"0123456789abcdef"
    };
    let mut out = String::new();
    if neg {
        out.push('-');
    }
    out.push('0');
    out.push(fmt);
    out.push((b'0' + ((mant >> 60) & 1) as u8) as char);
    mant <<= 4;
    if prec < 0 && mant != 0 {
        out.push('.');
        while mant != 0 {
            out.push(hex[((mant >> 60) & 15) as usize] as char);
            mant <<= 4;
        }
    } else if prec > 0 {
        out.push('.');
        for _ in 0..prec {
            out.push(hex[((mant >> 60) & 15) as usize] as char);
            mant <<= 4;
        }
    }
    out.push(if fmt == 'X' { 'P' } else { 'p' });
    if exp < 0 {
        out.push('-');
        exp = -exp;
    } else {
        out.push('+');
    }
    if exp < 10 {
        out.push('0');
    }
    out.push_str(&exp.to_string());
    out
}

/// Formats a float like Go's `strconv.FormatFloat`. `prec < 0` selects the
/// shortest representation that round-trips.
pub fn format_float(v: f64, fmt: char, prec: i32) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    match fmt {
        'b' => {
            let (neg, mant, exp) = float_parts(v);
            let exp = exp - 52;
            let sign = if neg { "-" } else { "" };
            let exp_sign = if exp >= 0 { "+" } else { "" };
            return format!("{sign}{mant}p{exp_sign}{exp}");
        }
        'x' | 'X' => return format_hex_float(v, fmt, prec),
        _ => {}
    }
    let neg = v.is_sign_negative();
    let abs = v.abs();
    let mut out = String::new();
    if neg {
        out.push('-');
    }
    let shortest = prec < 0;
    match fmt {
        'e' | 'E' => {
            let digs = if shortest {
                Digits::shortest(abs)
            } else {
                Digits::rounded(abs, prec as usize + 1)
            };
            let prec = if shortest { (digs.nd() - 1).max(0) } else { prec };
            digs.fmt_e(&mut out, prec, fmt);
        }
        'f' | 'F' => {
            if shortest {
                let digs = Digits::shortest(abs);
                digs.fmt_f(&mut out, (digs.nd() - digs.dp).max(0));
            } else {
                out.push_str(&format!("{:.*}", prec as usize, abs));
            }
        }
        _ => {
            let upper = fmt == 'G';
            let (digs, mut prec) = if shortest {
                let digs = Digits::shortest(abs);
                let nd = digs.nd();
                (digs, nd)
            } else {
                let prec = prec.max(1);
                (Digits::rounded(abs, prec as usize), prec)
            };
            let mut eprec = prec;
            if eprec > digs.nd() && digs.nd() >= digs.dp {
                eprec = digs.nd();
            }
            if shortest {
                eprec = 6;
            }
            let exp = digs.dp - 1;
            if !digs.d.is_empty() && (exp < -4 || exp >= eprec) {
                if prec > digs.nd() {
                    prec = digs.nd();
                }
                digs.fmt_e(&mut out, prec - 1, if upper { 'E' } else { 'e' });
            } else {
                if prec > digs.dp {
                    prec = digs.nd();
                }
                digs.fmt_f(&mut out, (prec - digs.dp).max(0));
            }
        }
    }
    out
}

#[derive(Debug, Default, Clone, Copy)]
struct Flags {
    plus: bool,
    minus: bool,
    sharp: bool,
    space: bool,
    zero: bool,
    sharp_v: bool,
    wid: Option<usize>,
    prec: Option<usize>,
}

#[derive(Default)]
struct Printer {
    buf: String,
    f: Flags,
}

const TOO_LARGE: usize = 1_000_000;

impl Printer {
    fn write_padding(&mut self, n: usize) {
        let pad = if self.f.zero && !self.f.minus { '0' } else { ' ' };
        self.buf.extend(std::iter::repeat(pad).take(n));
    }

    fn pad(&mut self, s: &str) {
        let Some(wid) = self.f.wid.filter(|w| *w > 0) else {
            self.buf.push_str(s);
            return;
        };
        let width = wid.saturating_sub(s.chars().count());
        if self.f.minus {
            self.buf.push_str(s);
            self.write_padding(width);
        } else {
            self.write_padding(width);
            self.buf.push_str(s);
        }
    }

    fn pad_no_zero(&mut self, s: &str) {
        let zero = std::mem::take(&mut self.f.zero);
        self.pad(s);
        self.f.zero = zero;
    }

    fn bad_verb(&mut self, verb: char, arg: &Value<'_>) {
        self.buf.push_str("%!");
        self.buf.push(verb);
        self.buf.push('(');
        if arg.is_nil_like() {
            self.buf.push_str(NIL_ANGLE);
        } else {
            self.buf.push_str(arg.type_name());
            self.buf.push('=');
            let mut plain = Printer::default();
            plain.print_arg(arg, 'v');
            self.buf.push_str(&plain.buf);
        }
        self.buf.push(')');
    }

    fn print_arg(&mut self, arg: &Value<'_>, verb: char) {
        if arg.is_nil_like() {
            match verb {
                'T' | 'v' => self.pad(NIL_ANGLE),
                _ => self.bad_verb(verb, arg),
            }
            return;
        }
        if verb == 'T' {
            let name = arg.type_name();
            self.fmt_s(name);
            return;
        }
        self.print_value(arg, verb, 0);
    }

    fn print_value(&mut self, value: &Value<'_>, verb: char, depth: usize) {
        match value {
            Value::Missing | Value::Nil => {
                if self.f.sharp_v {
                    self.buf.push_str("interface {}(nil)");
                } else {
                    self.buf.push_str(NIL_ANGLE);
                }
            }
            Value::Bool(b) => match verb {
                't' | 'v' => self.pad(if *b { "true" } else { "false" }),
                _ => self.bad_verb(verb, value),
            },
            Value::Int(n) => self.fmt_integer(*n, verb, value),
            Value::Float(f) => self.fmt_float(*f, verb, value),
            Value::Str(s) => self.fmt_string(s, verb, value),
            Value::Seq(items) => {
                if self.f.sharp_v {
                    self.buf.push_str("[]interface {}{");
                } else {
                    self.buf.push('[');
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.buf.push_str(if self.f.sharp_v { ", " } else { " " });
                    }
                    self.print_json(item, verb, depth + 1);
                }
                self.buf.push(if self.f.sharp_v { '}' } else { ']' });
            }
            Value::Map(map) => {
                if self.f.sharp_v {
                    self.buf.push_str("map[string]interface {}{");
                } else {
                    self.buf.push_str("map[");
                }
                for (i, (key, item)) in map.iter().enumerate() {
                    if i > 0 {
                        self.buf.push_str(if self.f.sharp_v { ", " } else { " " });
                    }
                    self.print_value(&Value::Str(key.as_str().into()), verb, depth + 1);
                    self.buf.push(':');
                    self.print_json(item, verb, depth + 1);
                }
                self.buf.push(if self.f.sharp_v { '}' } else { ']' });
            }
        }
    }

    fn print_json(&mut self, item: &Json, verb: char, depth: usize) {
        self.print_value(&Value::from_json(item), verb, depth);
    }

    fn fmt_integer(&mut self, n: i64, verb: char, arg: &Value<'_>) {
        match verb {
            'v' | 'd' => self.fmt_integer_base(n, 10, verb, false),
            'b' => self.fmt_integer_base(n, 2, verb, false),
            'o' | 'O' => self.fmt_integer_base(n, 8, verb, false),
            'x' => self.fmt_integer_base(n, 16, verb, false),
            'X' => self.fmt_integer_base(n, 16, verb, true),
            'c' => {
                let c = u32::try_from(n).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}');
                self.pad(c.encode_utf8(&mut [0; 4]));
            }
            'q' => {
                let c = u32::try_from(n).ok().and_then(char::from_u32).unwrap_or('\u{FFFD}');
                let quoted = quote_rune(c, self.f.plus);
                self.pad(&quoted);
            }
            'U' => {
                let u = n as u64;
                let width = self.f.prec.filter(|p| *p > 4).unwrap_or(4);
                let mut s = format!("U+{u:0width$X}");
                if self.f.sharp {
                    if let Some(c) = u32::try_from(u).ok().and_then(char::from_u32) {
                        if is_print(c) {
                            s.push_str(&format!(" '{c}'"));
                        }
                    }
                }
                self.pad_no_zero(&s);
            }
            _ => self.bad_verb(verb, arg),
        }
    }

    fn fmt_integer_base(&mut self, n: i64, base: u32, verb: char, upper: bool) {
        let negative = n < 0;
        let u = n.unsigned_abs();
        let mut prec = 0;
        if let Some(p) = self.f.prec {
            prec = p;
            if prec == 0 && u == 0 {
                let zero = std::mem::take(&mut self.f.zero);
                self.write_padding(self.f.wid.unwrap_or(0));
                self.f.zero = zero;
                return;
            }
        } else if let (true, false, Some(wid)) = (self.f.zero, self.f.minus, self.f.wid) {
            prec = wid;
            if negative || self.f.plus || self.f.space {
                prec = prec.saturating_sub(1);
            }
        }
        let mut digits = match (base, upper) {
            (2, _) => format!("{u:b}"),
            (8, _) => format!("{u:o}"),
            (16, false) => format!("{u:x}"),
            (16, true) => format!("{u:X}"),
            _ => u.to_string(),
        };
        if digits.len() < prec {
            digits = format!("{}{digits}", "0".repeat(prec - digits.len()));
        }
        let mut prefix = String::new();
        if self.f.sharp {
            match base {
                2 => prefix.push_str("0b"),
                8 if !digits.starts_with('0') => prefix.push('0'),
                16 => prefix.push_str(if upper { "0X" } else { "0x" }),
                _ => {}
            }
        }
        if verb == 'O' {
            prefix.insert_str(0, "0o");
        }
        if negative {
            prefix.insert(0, '-');
        } else if self.f.plus {
            prefix.insert(0, '+');
        } else if self.f.space {
            prefix.insert(0, ' ');
        }
        prefix.push_str(&digits);
        self.pad_no_zero(&prefix);
    }

    fn fmt_float(&mut self, v: f64, verb: char, arg: &Value<'_>) {
        match verb {
            'v' => self.fmt_float_prec(v, 'g', -1),
            'b' | 'g' | 'G' | 'x' | 'X' => self.fmt_float_prec(v, verb, -1),
            'f' | 'e' | 'E' | 'F' => self.fmt_float_prec(v, verb, 6),
            _ => self.bad_verb(verb, arg),
        }
    }

    fn fmt_float_prec(&mut self, v: f64, verb: char, prec: i32) {
        let prec = self.f.prec.map_or(prec, |p| p.min(i32::MAX as usize) as i32);
        let mut num = format_float(v, if verb == 'F' { 'f' } else { verb }, prec);
        if !num.starts_with(['-', '+']) {
            num.insert(0, '+');
        }
        if self.f.space && num.starts_with('+') && !self.f.plus {
            num.replace_range(0..1, " ");
        }
        let body = num.as_bytes()[1];
        if body == b'I' || body == b'N' {
            if body == b'N' && !self.f.space && !self.f.plus {
                num.remove(0);
            }
            self.pad_no_zero(&num);
            return;
        }
        if self.f.sharp && verb != 'b' {
            num = sharpen_float(num, verb, prec);
        }
        if self.f.plus || !num.starts_with('+') {
            match self.f.wid {
                Some(wid) if self.f.zero && !self.f.minus && wid > num.len() => {
                    let (sign, rest) = num.split_at(1);
                    self.buf.push_str(sign);
                    self.write_padding(wid - num.len());
                    self.buf.push_str(rest);
                }
                _ => self.pad(&num),
            }
            return;
        }
        self.pad(&num[1..]);
    }

    fn fmt_string(&mut self, s: &str, verb: char, arg: &Value<'_>) {
        match verb {
            'v' if self.f.sharp_v => self.fmt_q(s),
            'v' | 's' => self.fmt_s(s),
            'x' => self.fmt_sx(s, false),
            'X' => self.fmt_sx(s, true),
            'q' => self.fmt_q(s),
            _ => self.bad_verb(verb, arg),
        }
    }

    fn truncate<'s>(&self, s: &'s str) -> &'s str {
        match self.f.prec {
            Some(p) => match s.char_indices().nth(p) {
                Some((idx, _)) => &s[..idx],
                None => s,
            },
            None => s,
        }
    }

    fn fmt_s(&mut self, s: &str) {
        let s = self.truncate(s);
        self.pad(s);
    }

    fn fmt_q(&mut self, s: &str) {
        let s = self.truncate(s);
        if self.f.sharp && can_backquote(s) {
            self.pad(&format!("`{s}`"));
        } else {
            let quoted = quote_with(s, self.f.plus);
            self.pad(&quoted);
        }
    }

    fn fmt_sx(&mut self, s: &str, upper: bool) {
        let hex: &[u8; 16] = if upper {
            b"0123456789ABCDEF"
        } else {
            b"0123456789abcdef"
        };
        let bytes = s.as_bytes();
        let length = self.f.prec.map_or(bytes.len(), |p| p.min(bytes.len()));
        if length == 0 {
            if let Some(wid) = self.f.wid {
                self.write_padding(wid);
            }
            return;
        }
        let mut out = String::new();
        if self.f.sharp {
            out.push('0');
            out.push(if upper { 'X' } else { 'x' });
        }
        for (i, b) in bytes[..length].iter().enumerate() {
            if self.f.space && i > 0 {
                out.push(' ');
                if self.f.sharp {
                    out.push('0');
                    out.push(if upper { 'X' } else { 'x' });
                }
            }
            out.push(hex[(b >> 4) as usize] as char);
            out.push(hex[(b & 0xF) as usize] as char);
        }
        self.pad(&out);
    }

    fn do_print(&mut self, args: &[Value<'_>]) {
        let mut prev_string = false;
        for (i, arg) in args.iter().enumerate() {
            let is_string = arg.is_string();
            if i > 0 && !is_string && !prev_string {
                self.buf.push(' ');
            }
            self.print_arg(arg, 'v');
            prev_string = is_string;
        }
    }

    fn do_println(&mut self, args: &[Value<'_>]) {
        for (i, arg) in args.iter().enumerate() {
            if i > 0 {
                self.buf.push(' ');
            }
            self.print_arg(arg, 'v');
        }
        self.buf.push('\n');
    }

    fn do_printf(&mut self, format: &str, args: &[Value<'_>]) {
        let bytes = format.as_bytes();
        let end = bytes.len();
        let mut arg_num = 0usize;
        let mut reordered = false;
        let mut i = 0;
        'format: while i < end {
            let mut good_arg_num = true;
            let last = i;
            while i < end && bytes[i] != b'%' {
                i += 1;
            }
            if i > last {
                self.buf.push_str(&format[last..i]);
            }
            if i >= end {
                break;
            }
            i += 1;
            self.f = Flags::default();
            while i < end {
                match bytes[i] {
                    b'#' => self.f.sharp = true,
                    b'0' => self.f.zero = !self.f.minus,
                    b'+' => self.f.plus = true,
                    b'-' => {
                        self.f.minus = true;
                        self.f.zero = false;
                    }
                    b' ' => self.f.space = true,
                    _ => break,
                }
                i += 1;
            }

            let mut after_index;
            (arg_num, i, after_index) =
                arg_number(arg_num, format, i, args.len(), &mut reordered, &mut good_arg_num);

            if i < end && bytes[i] == b'*' {
                i += 1;
                let (wid, ok, next) = int_from_arg(args, arg_num);
                arg_num = next;
                if !ok {
                    self.buf.push_str("%!(BADWIDTH)");
                    self.f.wid = None;
                } else if wid < 0 {
                    self.f.wid = Some(wid.unsigned_abs() as usize);
                    self.f.minus = true;
                    self.f.zero = false;
                } else {
                    self.f.wid = Some(wid as usize);
                }
                after_index = false;
            } else {
                let (wid, next) = parse_num(bytes, i);
                self.f.wid = wid;
                i = next;
                if after_index && wid.is_some() {
                    good_arg_num = false;
                }
            }

            if i + 1 < end && bytes[i] == b'.' {
                i += 1;
                if after_index {
                    good_arg_num = false;
                }
                (arg_num, i, after_index) =
                    arg_number(arg_num, format, i, args.len(), &mut reordered, &mut good_arg_num);
                if i < end && bytes[i] == b'*' {
                    i += 1;
                    let (prec, ok, next) = int_from_arg(args, arg_num);
                    arg_num = next;
                    if !ok {
                        self.buf.push_str("%!(BADPREC)");
                        self.f.prec = None;
                    } else if prec < 0 {
                        self.f.prec = None;
                    } else {
                        self.f.prec = Some(prec as usize);
                    }
                    after_index = false;
                } else {
                    let (prec, next) = parse_num(bytes, i);
                    self.f.prec = Some(prec.unwrap_or(0));
                    i = next;
                }
            }

            if !after_index {
                (arg_num, i, _) =
                    arg_number(arg_num, format, i, args.len(), &mut reordered, &mut good_arg_num);
            }

            let Some(verb) = format[i.min(end)..].chars().next() else {
                self.buf.push_str("%!(NOVERB)");
                break 'format;
            };
            i += verb.len_utf8();

            match verb {
                '%' => self.buf.push('%'),
                _ if !good_arg_num => {
                    self.buf.push_str("%!");
                    self.buf.push(verb);
                    self.buf.push_str("(BADINDEX)");
                }
                _ if arg_num >= args.len() => {
                    self.buf.push_str("%!");
                    self.buf.push(verb);
                    self.buf.push_str("(MISSING)");
                }
                _ => {
                    if verb == 'v' {
                        self.f.sharp_v = self.f.sharp;
                        self.f.sharp = false;
                        self.f.plus = false;
                    }
                    self.print_arg(&args[arg_num], verb);
                    arg_num += 1;
                }
            }
        }

        if !reordered && arg_num < args.len() {
            self.f = Flags::default();
            self.buf.push_str("%!(EXTRA ");
            for (i, arg) in args[arg_num..].iter().enumerate() {
                if i > 0 {
                    self.buf.push_str(", ");
                }
                if arg.is_nil_like() {
                    self.buf.push_str(NIL_ANGLE);
                } else {
                    self.buf.push_str(arg.type_name());
                    self.buf.push('=');
                    self.print_arg(arg, 'v');
                }
            }
            self.buf.push(')');
        }
    }
}

/// Applies the `#` flag to a formatted float: always keep a decimal point
/// and, for `%g`-like verbs, keep trailing zeros.
fn sharpen_float(num: String, verb: char, prec: i32) -> String {
    let mut digits = match verb {
        'v' | 'g' | 'G' | 'x' => {
            if prec == -1 {
                6
            } else {
                prec
            }
        }
        _ => 0,
    };
    let bytes = num.as_bytes();
    let mut body_end = bytes.len();
    let mut has_point = false;
    let mut saw_nonzero = false;
    for (i, &b) in bytes.iter().enumerate().skip(1) {
        match b {
            b'.' => has_point = true,
            b'p' | b'P' => {
                body_end = i;
                break;
            }
            b'e' | b'E' if verb != 'x' && verb != 'X' => {
                body_end = i;
                break;
            }
            _ => {
                if b != b'0' {
                    saw_nonzero = true;
                }
                if saw_nonzero {
                    digits -= 1;
                }
            }
        }
    }
    let (body, tail) = num.split_at(body_end);
    let mut out = body.to_string();
    if !has_point {
        if body.len() == 2 && body.as_bytes()[1] == b'0' {
            digits -= 1;
        }
        out.push('.');
    }
    while digits > 0 {
        out.push('0');
        digits -= 1;
    }
    out.push_str(tail);
    out
}

fn parse_num(bytes: &[u8], start: usize) -> (Option<usize>, usize) {
    let mut i = start;
    let mut num: usize = 0;
    let mut is_num = false;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        if num > TOO_LARGE {
            return (None, bytes.len());
        }
        num = num * 10 + usize::from(bytes[i] - b'0');
        is_num = true;
        i += 1;
    }
    (is_num.then_some(num), i)
}

fn arg_number(
    arg_num: usize,
    format: &str,
    i: usize,
    num_args: usize,
    reordered: &mut bool,
    good_arg_num: &mut bool,
) -> (usize, usize, bool) {
    let bytes = format.as_bytes();
    if i >= bytes.len() || bytes[i] != b'[' {
        return (arg_num, i, false);
    }
    *reordered = true;
    let rest = &bytes[i..];
    let parsed = rest.iter().position(|b| *b == b']').map(|close| {
        let (num, next) = parse_num(rest, 1);
        match num {
            Some(n) if next == close && n >= 1 => (Some(n - 1), close + 1),
            _ => (None, close + 1),
        }
    });
    match parsed {
        Some((Some(index), width)) if index < num_args => (index, i + width, true),
        Some((ok, width)) => {
            *good_arg_num = false;
            (arg_num, i + width, ok.is_some())
        }
        None => {
            *good_arg_num = false;
            (arg_num, i + 1, false)
        }
    }
}

fn int_from_arg(args: &[Value<'_>], arg_num: usize) -> (i64, bool, usize) {
    match args.get(arg_num) {
        Some(Value::Int(n)) if n.unsigned_abs() <= TOO_LARGE as u64 => (*n, true, arg_num + 1),
        Some(_) => (0, false, arg_num + 1),
        None => (0, false, arg_num),
    }
}

/// `fmt.Sprint`: spaces between operands when neither side is a string.
pub fn sprint(args: &[Value<'_>]) -> String {
    let mut p = Printer::default();
    p.do_print(args);
    p.buf
}

/// `fmt.Sprintln`: operands always space-separated, newline appended.
pub fn sprintln(args: &[Value<'_>]) -> String {
    let mut p = Printer::default();
    p.do_println(args);
    p.buf
}

pub fn sprintf(format: &str, args: &[Value<'_>]) -> String {
    let mut p = Printer::default();
    p.do_printf(format, args);
    p.buf
}

/// The `%v` rendering of a single value.
pub fn display(value: &Value<'_>) -> String {
    let mut p = Printer::default();
    p.print_arg(value, 'v');
    p.buf
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn s(text: &str) -> Value<'_> {
        Value::Str(text.into())
    }

    #[test]
    fn floats_print_shortest() {
        assert_eq!(display(&Value::Float(3.0)), "3");
        assert_eq!(display(&Value::Float(2.5)), "2.5");
        assert_eq!(display(&Value::Float(1e6)), "1e+06");
        assert_eq!(display(&Value::Float(123456.0)), "123456");
        assert_eq!(display(&Value::Float(0.0001)), "0.0001");
        assert_eq!(display(&Value::Float(0.00001)), "1e-05");
        assert_eq!(display(&Value::Float(-0.5)), "-0.5");
    }

    #[test]
    fn containers_print_like_go() {
        let doc = json!({"b": [1, "x", null], "a": true});
        assert_eq!(display(&Value::from_json(&doc)), "map[a:true b:[1 x <nil>]]");
    }

    #[test]
    fn sprint_spaces_only_between_non_strings() {
        assert_eq!(sprint(&[s("a"), Value::Int(1), Value::Int(2), s("b")]), "a1 2b");
        assert_eq!(sprintln(&[s("a"), Value::Int(1)]), "a 1\n");
    }

    #[test]
    fn printf_verbs() {
        assert_eq!(sprintf("%d|%5.2f|%-4s|%q", &[Value::Int(7), Value::Float(3.14159), s("ab"), s("hi\n")]), "7| 3.14|ab  |\"hi\\n\"");
        assert_eq!(sprintf("%x %X %o %b", &[Value::Int(255), Value::Int(255), Value::Int(8), Value::Int(5)]), "ff FF 10 101");
        assert_eq!(sprintf("%05d|%+d|%#x", &[Value::Int(-42), Value::Int(3), Value::Int(255)]), "-0042|+3|0xff");
        assert_eq!(sprintf("%e|%g|%.3g", &[Value::Float(1234.5678), Value::Float(0.000012), Value::Float(1234.5678)]), "1.234568e+03|1.2e-05|1.23e+03");
        assert_eq!(sprintf("%c%U|%t|%%", &[Value::Int(65), Value::Int(0x1F600), Value::Bool(true)]), "AU+1F600|true|%");
    }

    #[test]
    fn printf_diagnostics() {
        assert_eq!(sprintf("%d", &[Value::Float(1.5)]), "%!d(float64=1.5)");
        assert_eq!(sprintf("%d %d", &[Value::Int(1)]), "1 %!d(MISSING)");
        assert_eq!(sprintf("%d", &[Value::Int(1), s("x")]), "1%!(EXTRA string=x)");
        assert_eq!(sprintf("%", &[]), "%!(NOVERB)");
        assert_eq!(sprintf("%s", &[Value::Nil]), "%!s(<nil>)");
        assert_eq!(sprintf("%[2]d %[1]d", &[Value::Int(1), Value::Int(2)]), "2 1");
    }

    #[test]
    fn quoting() {
        assert_eq!(go_quote("a\"b\\c\u{1}é"), "\"a\\\"b\\\\c\\x01é\"");
        assert_eq!(go_rune('#'), "U+0023 '#'");
        assert_eq!(go_rune('\0'), "U+0000");
    }

    #[test]
    fn float_formats() {
        assert_eq!(format_float(1.5, 'x', -1), "0x1.8p+00");
        assert_eq!(format_float(1.0, 'b', -1), "4503599627370496p-52");
        assert_eq!(format_float(0.0, 'e', 2), "0.00e+00");
        assert_eq!(format_float(100.0, 'g', -1), "100");
        assert_eq!(format_float(1.0, 'g', 3), "1");
    }
}
