//! 参数描述文本的搜索与修补
//!
//! 上传的参数描述是以 `\n` 结尾的多行文本，每行是逗号分隔的属性列表，例如
//!
//! ```text
//! OFFSET_ADD:0,layer_name:crop0,drp_lib:crop,prop:input,
//! OFFSET_ADD:64,layer_name:resize0,drp_lib:resize,
//! ```
//!
//! 通过 `OFFSET_ADD` 属性找到 drp_param.bin 中对应节点的位置，然后修补其中的字段。

use super::{
    DRP_PARAM_MAX_LINE_LENGTH,
    error::{DrpaiError, DrpaiResult},
    platform::{DrpaiPlatform, param_change16, param_change32},
    types::*,
};

/// 逐行遍历参数文本
///
/// 每次返回包含 `\n` 的一行；最后一行没有 `\n` 或某行超过最大长度时返回 `Fault`。
struct ParamLines<'a> {
    rest: &'a [u8],
}

impl<'a> ParamLines<'a> {
    fn new(blob: &'a [u8]) -> Self {
        // 只处理第一个 NUL 之前的内容
        let end = blob.iter().position(|&b| b == 0).unwrap_or(blob.len());
        Self { rest: &blob[..end] }
    }
}

impl<'a> Iterator for ParamLines<'a> {
    type Item = DrpaiResult<&'a [u8]>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.rest.is_empty() {
            return None;
        }
        let Some(pos) = self.rest.iter().position(|&b| b == b'\n') else {
            self.rest = &[];
            return Some(Err(DrpaiError::Fault));
        };
        let (line, rest) = self.rest.split_at(pos + 1);
        self.rest = rest;
        if line.len() >= DRP_PARAM_MAX_LINE_LENGTH {
            self.rest = &[];
            return Some(Err(DrpaiError::Fault));
        }
        Some(Ok(line))
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    find(haystack, needle).is_some()
}

/// 取出行内某个数值属性 (十进制，到下一个 `,` 或行尾为止)
pub fn get_param_attr(line: &[u8], attr: &[u8]) -> DrpaiResult<u32> {
    let start = find(line, attr).ok_or(DrpaiError::Fault)? + attr.len();
    let value = &line[start..];
    let end = value
        .iter()
        .position(|&b| b == b',' || b == b'\n')
        .unwrap_or(value.len());
    core::str::from_utf8(&value[..end])
        .ok()
        .and_then(|s| s.trim_end_matches('\r').parse::<u32>().ok())
        .ok_or(DrpaiError::Fault)
}

/// 查找 crop 节点及其后继节点的偏移
///
/// 返回 `(offset0, offset1)`：offset0 来自含 `,drp_lib:crop,` 的行，
/// offset1 来自其后第一个含 `OFFSET_ADD` 的行。
pub fn find_crop_offsets(blob: &[u8]) -> DrpaiResult<(u32, u32)> {
    let mut offset0 = None;
    for line in ParamLines::new(blob) {
        let line = line?;
        match offset0 {
            None => {
                if contains(line, DRP_LIB_NAME_CROP) {
                    offset0 = Some(get_param_attr(line, DRP_PARAM_ATTR_OFFSET_ADD)?);
                }
            }
            Some(offset0) => {
                if contains(line, DRP_PARAM_ATTR_OFFSET_ADD) {
                    let offset1 = get_param_attr(line, DRP_PARAM_ATTR_OFFSET_ADD)?;
                    return Ok((offset0, offset1));
                }
            }
        }
    }
    Err(DrpaiError::Fault)
}

/// 查找名字含 `name` 的输入节点偏移
pub fn find_input_offset(blob: &[u8], name: &[u8]) -> DrpaiResult<u32> {
    for line in ParamLines::new(blob) {
        let line = line?;
        if contains(line, DRP_PARAM_ATTR_PROP_INPUT) && contains(line, name) {
            return get_param_attr(line, DRP_PARAM_ATTR_OFFSET_ADD);
        }
    }
    Err(DrpaiError::Fault)
}

/// 待写入的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamField {
    U16 { offset: u32, value: u16 },
    U32 { offset: u32, value: u32 },
}

impl ParamField {
    fn offset(&self) -> u32 {
        match *self {
            ParamField::U16 { offset, .. } | ParamField::U32 { offset, .. } => offset,
        }
    }

    fn width(&self) -> u32 {
        match self {
            ParamField::U16 { .. } => 2,
            ParamField::U32 { .. } => 4,
        }
    }
}

/// crop 修补要写的六个字段
///
/// 后继节点的输入宽高等于 crop 的输出宽高。
pub fn crop_fields(crop: &DrpaiCrop, offset0: u32, offset1: u32) -> DrpaiResult<[ParamField; 6]> {
    let at = |base: u32, field: u32| base.checked_add(field).ok_or(DrpaiError::Fault);
    Ok([
        ParamField::U16 { offset: at(offset0, DRP_PARAM_IMG_OWIDTH)?, value: crop.img_owidth },
        ParamField::U16 { offset: at(offset0, DRP_PARAM_IMG_OHEIGHT)?, value: crop.img_oheight },
        ParamField::U16 { offset: at(offset0, DRP_PARAM_CROP_POS_X)?, value: crop.pos_x },
        ParamField::U16 { offset: at(offset0, DRP_PARAM_CROP_POS_Y)?, value: crop.pos_y },
        ParamField::U16 { offset: at(offset1, DRP_PARAM_IMG_IWIDTH)?, value: crop.img_owidth },
        ParamField::U16 { offset: at(offset1, DRP_PARAM_IMG_IHEIGHT)?, value: crop.img_oheight },
    ])
}

/// 把字段写入参数对象 (先全部检查范围，再逐个写入并刷新)
pub fn apply_fields(
    platform: &dyn DrpaiPlatform,
    obj: &DrpaiData,
    fields: &[ParamField],
) -> DrpaiResult<()> {
    for field in fields {
        let end = field
            .offset()
            .checked_add(field.width())
            .ok_or(DrpaiError::Fault)?;
        if end > obj.size {
            warn!(
                "[DRPAI] param field at {} outside object of size {}",
                field.offset(),
                obj.size
            );
            return Err(DrpaiError::Fault);
        }
    }
    for field in fields {
        match *field {
            ParamField::U16 { offset, value } => param_change16(platform, obj.address, offset, value)?,
            ParamField::U32 { offset, value } => param_change32(platform, obj.address, offset, value)?,
        }
    }
    Ok(())
}
