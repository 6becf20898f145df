//! Compact binary encoding for core value types.
//!
//! This is the second, serde-independent encoding used to move large
//! payloads across process boundaries cheaply: length-prefixed UTF-8
//! strings, fixed-width big-endian numerics, and a one-byte present/absent
//! discriminator for optional fields. Collections are count-prefixed and
//! written in iteration order, so encoding a value twice yields identical
//! bytes.

use chrono::{Datelike, NaiveDate};

use crate::domain::{
    BilingualText, Coordinates, Operator, Route, RouteSearchResultEntry, Stop, StopInfo,
};

/// Errors from decoding a binary payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("invalid UTF-8 in string field")]
    InvalidUtf8,

    #[error("invalid discriminator byte: {0}")]
    InvalidDiscriminator(u8),

    #[error("invalid date value: {0}")]
    InvalidDate(i32),
}

/// Types that can be written to the compact binary form.
pub trait BinaryWrite {
    fn write_to(&self, out: &mut Vec<u8>);

    /// Encode into a fresh buffer.
    fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out
    }
}

/// Types that can be read back from the compact binary form.
pub trait BinaryRead: Sized {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError>;

    /// Decode a complete buffer, rejecting trailing bytes.
    fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut input = bytes;
        let value = Self::read_from(&mut input)?;
        if !input.is_empty() {
            return Err(CodecError::InvalidDiscriminator(input[0]));
        }
        Ok(value)
    }
}

fn take<'a>(input: &mut &'a [u8], n: usize) -> Result<&'a [u8], CodecError> {
    if input.len() < n {
        return Err(CodecError::UnexpectedEof);
    }
    let (head, tail) = input.split_at(n);
    *input = tail;
    Ok(head)
}

pub fn write_u8(out: &mut Vec<u8>, v: u8) {
    out.push(v);
}

pub fn read_u8(input: &mut &[u8]) -> Result<u8, CodecError> {
    Ok(take(input, 1)?[0])
}

pub fn write_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn read_u32(input: &mut &[u8]) -> Result<u32, CodecError> {
    let bytes = take(input, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn read_i32(input: &mut &[u8]) -> Result<i32, CodecError> {
    let bytes = take(input, 4)?;
    Ok(i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

pub fn write_f64(out: &mut Vec<u8>, v: f64) {
    out.extend_from_slice(&v.to_be_bytes());
}

pub fn read_f64(input: &mut &[u8]) -> Result<f64, CodecError> {
    let bytes = take(input, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    Ok(f64::from_be_bytes(buf))
}

pub fn write_bool(out: &mut Vec<u8>, v: bool) {
    out.push(v as u8);
}

pub fn read_bool(input: &mut &[u8]) -> Result<bool, CodecError> {
    match read_u8(input)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::InvalidDiscriminator(other)),
    }
}

pub fn write_str(out: &mut Vec<u8>, s: &str) {
    write_u32(out, s.len() as u32);
    out.extend_from_slice(s.as_bytes());
}

pub fn read_string(input: &mut &[u8]) -> Result<String, CodecError> {
    let len = read_u32(input)? as usize;
    let bytes = take(input, len)?;
    String::from_utf8(bytes.to_vec()).map_err(|_| CodecError::InvalidUtf8)
}

/// Write an optional value behind a present/absent discriminator byte.
pub fn write_option<T>(out: &mut Vec<u8>, value: Option<&T>, f: impl FnOnce(&mut Vec<u8>, &T)) {
    match value {
        Some(v) => {
            write_u8(out, 1);
            f(out, v);
        }
        None => write_u8(out, 0),
    }
}

/// Read an optional value written by [`write_option`].
pub fn read_option<T>(
    input: &mut &[u8],
    f: impl FnOnce(&mut &[u8]) -> Result<T, CodecError>,
) -> Result<Option<T>, CodecError> {
    match read_u8(input)? {
        0 => Ok(None),
        1 => Ok(Some(f(input)?)),
        other => Err(CodecError::InvalidDiscriminator(other)),
    }
}

/// Write a count-prefixed sequence.
pub fn write_seq<T>(
    out: &mut Vec<u8>,
    items: impl ExactSizeIterator<Item = T>,
    mut f: impl FnMut(&mut Vec<u8>, T),
) {
    write_u32(out, items.len() as u32);
    for item in items {
        f(out, item);
    }
}

/// Read a count-prefixed sequence into a `Vec`.
pub fn read_vec<T>(
    input: &mut &[u8],
    mut f: impl FnMut(&mut &[u8]) -> Result<T, CodecError>,
) -> Result<Vec<T>, CodecError> {
    let count = read_u32(input)? as usize;
    let mut items = Vec::with_capacity(count.min(4096));
    for _ in 0..count {
        items.push(f(input)?);
    }
    Ok(items)
}

fn write_date(out: &mut Vec<u8>, date: &NaiveDate) {
    write_i32(out, date.num_days_from_ce());
}

fn read_date(input: &mut &[u8]) -> Result<NaiveDate, CodecError> {
    let days = read_i32(input)?;
    NaiveDate::from_num_days_from_ce_opt(days).ok_or(CodecError::InvalidDate(days))
}

impl BinaryWrite for Operator {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_str(out, self.as_str());
    }
}

impl BinaryRead for Operator {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        Ok(Operator::parse(&read_string(input)?))
    }
}

impl BinaryWrite for Coordinates {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_f64(out, self.lat);
        write_f64(out, self.lng);
    }
}

impl BinaryRead for Coordinates {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        let lat = read_f64(input)?;
        let lng = read_f64(input)?;
        Ok(Coordinates { lat, lng })
    }
}

impl BinaryWrite for BilingualText {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_str(out, &self.zh);
        write_str(out, &self.en);
    }
}

impl BinaryRead for BilingualText {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        let zh = read_string(input)?;
        let en = read_string(input)?;
        Ok(BilingualText { zh, en })
    }
}

impl BinaryWrite for Stop {
    fn write_to(&self, out: &mut Vec<u8>) {
        self.location.write_to(out);
        self.name.write_to(out);
        write_option(out, self.remark.as_ref(), |o, v| v.write_to(o));
        write_option(out, self.aux_id.as_ref(), |o, v| write_str(o, v));
    }
}

impl BinaryRead for Stop {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        let location = Coordinates::read_from(input)?;
        let name = BilingualText::read_from(input)?;
        let remark = read_option(input, BilingualText::read_from)?;
        let aux_id = read_option(input, read_string)?;
        Ok(Stop {
            location,
            name,
            remark,
            aux_id,
        })
    }
}

impl BinaryWrite for Route {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_str(out, &self.route_number);
        write_seq(out, self.bound.iter(), |o, (op, dir)| {
            op.write_to(o);
            write_str(o, dir);
        });
        write_seq(out, self.co.iter(), |o, op| op.write_to(o));
        write_str(out, &self.service_type);
        write_option(out, self.variant_id.as_ref(), |o, v| write_str(o, v));
        write_option(out, self.line_id.as_ref(), |o, v| write_str(o, v));
        write_option(out, self.region.as_ref(), |o, v| write_str(o, v));
        write_bool(out, self.circular);
        write_bool(out, self.joint_operated);
        self.orig.write_to(out);
        self.dest.write_to(out);
        write_seq(out, self.stops.iter(), |o, (op, ids)| {
            op.write_to(o);
            write_seq(o, ids.iter(), |o2, id| write_str(o2, id));
        });
    }
}

impl BinaryRead for Route {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        let route_number = read_string(input)?;
        let bound = read_vec(input, |i| {
            let op = Operator::read_from(i)?;
            let dir = read_string(i)?;
            Ok((op, dir))
        })?
        .into_iter()
        .collect();
        let co = read_vec(input, Operator::read_from)?;
        let service_type = read_string(input)?;
        let variant_id = read_option(input, read_string)?;
        let line_id = read_option(input, read_string)?;
        let region = read_option(input, read_string)?;
        let circular = read_bool(input)?;
        let joint_operated = read_bool(input)?;
        let orig = BilingualText::read_from(input)?;
        let dest = BilingualText::read_from(input)?;
        let stops = read_vec(input, |i| {
            let op = Operator::read_from(i)?;
            let ids = read_vec(i, read_string)?;
            Ok((op, ids))
        })?
        .into_iter()
        .collect();
        Ok(Route {
            route_number,
            bound,
            co,
            service_type,
            variant_id,
            line_id,
            region,
            circular,
            joint_operated,
            orig,
            dest,
            stops,
        })
    }
}

impl BinaryWrite for StopInfo {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_str(out, &self.stop_id);
        write_option(out, self.data.as_ref(), |o, v| v.write_to(o));
        write_f64(out, self.distance);
        self.operator.write_to(out);
        write_option(out, self.stop_index.as_ref(), |o, v| write_u32(o, *v));
    }
}

impl BinaryRead for StopInfo {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        let stop_id = read_string(input)?;
        let data = read_option(input, Stop::read_from)?;
        let distance = read_f64(input)?;
        let operator = Operator::read_from(input)?;
        let stop_index = read_option(input, read_u32)?;
        Ok(StopInfo {
            stop_id,
            data,
            distance,
            operator,
            stop_index,
        })
    }
}

impl BinaryWrite for RouteSearchResultEntry {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_str(out, &self.route_key);
        write_option(out, self.route.as_ref(), |o, v| v.write_to(o));
        self.operator.write_to(out);
        write_option(out, self.stop_info.as_ref(), |o, v| v.write_to(o));
        write_option(out, self.origin.as_ref(), |o, v| v.write_to(o));
        write_bool(out, self.interchange_search);
    }
}

impl BinaryRead for RouteSearchResultEntry {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        let route_key = read_string(input)?;
        let route = read_option(input, Route::read_from)?;
        let operator = Operator::read_from(input)?;
        let stop_info = read_option(input, StopInfo::read_from)?;
        let origin = read_option(input, Coordinates::read_from)?;
        let interchange_search = read_bool(input)?;
        Ok(RouteSearchResultEntry {
            route_key,
            route,
            operator,
            stop_info,
            origin,
            interchange_search,
        })
    }
}

impl BinaryWrite for crate::directory::DataSheet {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_seq(out, self.holidays.iter(), write_date);
        write_seq(out, self.route_list.iter(), |o, (key, route)| {
            write_str(o, key);
            route.write_to(o);
        });
        write_seq(out, self.stop_list.iter(), |o, (id, stop)| {
            write_str(o, id);
            stop.write_to(o);
        });
        write_seq(out, self.stop_map.iter(), |o, (id, refs)| {
            write_str(o, id);
            write_seq(o, refs.iter(), |o2, (op, key)| {
                op.write_to(o2);
                write_str(o2, key);
            });
        });
    }
}

impl BinaryRead for crate::directory::DataSheet {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        let holidays = read_vec(input, read_date)?;
        let route_list = read_vec(input, |i| {
            let key = read_string(i)?;
            let route = Route::read_from(i)?;
            Ok((key, route))
        })?
        .into_iter()
        .collect();
        let stop_list = read_vec(input, |i| {
            let id = read_string(i)?;
            let stop = Stop::read_from(i)?;
            Ok((id, stop))
        })?
        .into_iter()
        .collect();
        let stop_map = read_vec(input, |i| {
            let id = read_string(i)?;
            let refs = read_vec(i, |i2| {
                let op = Operator::read_from(i2)?;
                let key = read_string(i2)?;
                Ok((op, key))
            })?;
            Ok((id, refs))
        })?
        .into_iter()
        .collect();
        Ok(crate::directory::DataSheet {
            holidays,
            route_list,
            stop_list,
            stop_map,
        })
    }
}

impl BinaryWrite for crate::favourites::FavouriteRouteStop {
    fn write_to(&self, out: &mut Vec<u8>) {
        write_str(out, &self.stop_id);
        self.operator.write_to(out);
        write_u32(out, self.stop_index);
        self.stop.write_to(out);
        write_str(out, &self.route_key);
        self.route.write_to(out);
        write_u8(out, self.mode as u8);
    }
}

impl BinaryRead for crate::favourites::FavouriteRouteStop {
    fn read_from(input: &mut &[u8]) -> Result<Self, CodecError> {
        use crate::favourites::FavouriteStopMode;

        let stop_id = read_string(input)?;
        let operator = Operator::read_from(input)?;
        let stop_index = read_u32(input)?;
        let stop = Stop::read_from(input)?;
        let route_key = read_string(input)?;
        let route = Route::read_from(input)?;
        let mode = match read_u8(input)? {
            0 => FavouriteStopMode::Fixed,
            1 => FavouriteStopMode::Closest,
            other => return Err(CodecError::InvalidDiscriminator(other)),
        };
        Ok(crate::favourites::FavouriteRouteStop {
            stop_id,
            operator,
            stop_index,
            stop,
            route_key,
            route,
            mode,
        })
    }
}
