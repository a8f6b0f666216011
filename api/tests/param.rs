mod common;

use common::*;
use drpai_api::{DrpaiFile, vfs::dev::drpai::*};

const PARAM_OBJ: DrpaiData = DrpaiData::new(0x8000, 0x100);

/// Parameter description padded with NULs to `size` bytes.
fn blob(size: usize) -> Vec<u8> {
    let mut text = b"OFFSET_ADD:0,in0,prop:input,\n\
OFFSET_ADD:64,drp_lib:crop,\n\
OFFSET_ADD:128,resize,\n"
        .to_vec();
    assert!(text.len() <= size);
    text.resize(size, 0);
    text
}

fn upload(file: &DrpaiFile, obj: DrpaiData) {
    let info = blob(100);
    file.assign_param(&DrpaiAssignParam { info_size: 100, obj })
        .unwrap();
    assert_eq!(file.write(&info), Ok(100));
    assert_eq!(file.phase(), RwPhase::IdleRw);
}

fn crop(obj: DrpaiData) -> DrpaiCrop {
    DrpaiCrop {
        img_owidth: 320,
        img_oheight: 240,
        pos_x: 16,
        pos_y: 8,
        obj,
    }
}

#[test]
fn upload_in_two_writes_then_mismatched_crop_is_invalid() {
    let fx = setup();
    let file = fx.dev.open().unwrap();
    let info = blob(100);

    file.assign_param(&DrpaiAssignParam { info_size: 100, obj: PARAM_OBJ })
        .unwrap();
    assert_eq!(file.phase(), RwPhase::AssignedParam);
    assert_eq!(file.write(&info[..60]), Ok(60));
    assert_eq!(file.phase(), RwPhase::WritingParam);
    assert_eq!(file.write(&info[60..]), Ok(40));
    assert_eq!(file.phase(), RwPhase::IdleRw);

    let other = DrpaiData::new(0x9000, 0x100);
    assert_eq!(file.prepost_crop(&crop(other)), Err(DrpaiError::InvalidArg));
}

#[test]
fn crop_patches_the_crop_node_and_its_follower() {
    let fx = setup();
    let file = fx.dev.open().unwrap();
    upload(&file, PARAM_OBJ);

    file.prepost_crop(&crop(PARAM_OBJ)).unwrap();

    let base = PARAM_OBJ.address;
    assert_eq!(fx.platform.peek_u16(base + 64 + DRP_PARAM_IMG_OWIDTH), 320);
    assert_eq!(fx.platform.peek_u16(base + 64 + DRP_PARAM_IMG_OHEIGHT), 240);
    assert_eq!(fx.platform.peek_u16(base + 64 + DRP_PARAM_CROP_POS_X), 16);
    assert_eq!(fx.platform.peek_u16(base + 64 + DRP_PARAM_CROP_POS_Y), 8);
    assert_eq!(fx.platform.peek_u16(base + 128 + DRP_PARAM_IMG_IWIDTH), 320);
    assert_eq!(fx.platform.peek_u16(base + 128 + DRP_PARAM_IMG_IHEIGHT), 240);
    assert!(fx.platform.flushes().contains(&((base + 128 + DRP_PARAM_IMG_IWIDTH) as usize, 2)));
}

#[test]
fn crop_is_rejected_while_uploading_or_without_blob() {
    let fx = setup();
    let file = fx.dev.open().unwrap();
    assert_eq!(file.prepost_crop(&crop(PARAM_OBJ)), Err(DrpaiError::AccessDenied));

    file.assign_param(&DrpaiAssignParam { info_size: 100, obj: PARAM_OBJ })
        .unwrap();
    assert_eq!(file.prepost_crop(&crop(PARAM_OBJ)), Err(DrpaiError::AccessDenied));
    file.write(&blob(100)[..10]).unwrap();
    assert_eq!(file.prepost_crop(&crop(PARAM_OBJ)), Err(DrpaiError::AccessDenied));
}

#[test]
fn crop_while_running_is_busy() {
    let fx = setup();
    let file = fx.dev.open().unwrap();
    upload(&file, PARAM_OBJ);
    file.start(&proc_descs()).unwrap();

    assert_eq!(file.prepost_crop(&crop(PARAM_OBJ)), Err(DrpaiError::Busy));
    fx.dev.handle_irq(DrpaiIrq::AimacNormal);
    file.prepost_crop(&crop(PARAM_OBJ)).unwrap();
}

#[test]
fn crop_field_outside_the_object_is_a_fault() {
    let fx = setup();
    let file = fx.dev.open().unwrap();
    let small = DrpaiData::new(0x8000, 0x40);
    upload(&file, small);

    assert_eq!(file.prepost_crop(&crop(small)), Err(DrpaiError::Fault));
    assert_eq!(fx.platform.peek(0x8000, 0x100), vec![0; 0x100]);
}

#[test]
fn malformed_blob_is_a_fault() {
    let fx = setup();
    let file = fx.dev.open().unwrap();
    let info = b"OFFSET_ADD:64,drp_lib:crop,".to_vec();
    file.assign_param(&DrpaiAssignParam {
        info_size: info.len() as u32,
        obj: PARAM_OBJ,
    })
    .unwrap();
    file.write(&info).unwrap();

    assert_eq!(file.prepost_crop(&crop(PARAM_OBJ)), Err(DrpaiError::Fault));
}

#[test]
fn input_address_patch_redirects_start() {
    let fx = setup();
    let file = fx.dev.open().unwrap();
    upload(&file, PARAM_OBJ);

    let data = DrpaiData::new(LINUX_MEM_START + 0x4000, 0x2000);
    file.prepost_inaddr(&DrpaiInout::new("in0", data, PARAM_OBJ))
        .unwrap();
    assert!(file.input_redirected());
    assert_eq!(fx.platform.peek_u32(PARAM_OBJ.address + DRP_PARAM_RADDR), data.address);
    assert!(fx.platform.flushes().contains(&(data.address as usize, 0x2000)));

    file.start(&proc_descs()).unwrap();
    // drp_param of the start payload is left alone
    assert_eq!(fx.platform.peek_u32(proc_descs()[DRPAI_INDEX_DRP_PARAM].address), 0);
}

#[test]
fn input_address_patch_needs_a_known_input_node() {
    let fx = setup();
    let file = fx.dev.open().unwrap();
    upload(&file, PARAM_OBJ);

    let data = DrpaiData::new(LINUX_MEM_START, 0x100);
    assert_eq!(
        file.prepost_inaddr(&DrpaiInout::new("in9", data, PARAM_OBJ)),
        Err(DrpaiError::Fault)
    );
    assert_eq!(
        file.prepost_inaddr(&DrpaiInout::new("in0", data, DrpaiData::new(0x9000, 0x100))),
        Err(DrpaiError::InvalidArg)
    );
    assert!(!file.input_redirected());
}

#[test]
fn assign_param_checks_arguments_and_phase() {
    let fx = setup();
    let file = fx.dev.open().unwrap();

    assert_eq!(
        file.assign_param(&DrpaiAssignParam { info_size: 0, obj: PARAM_OBJ }),
        Err(DrpaiError::InvalidArg)
    );
    assert_eq!(
        file.assign_param(&DrpaiAssignParam {
            info_size: 100,
            obj: DrpaiData::new(0x8000, 0),
        }),
        Err(DrpaiError::InvalidArg)
    );
    assert_eq!(
        file.assign_param(&DrpaiAssignParam {
            info_size: 100,
            obj: DrpaiData::new(REGION_SIZE - 0x40, 0x100),
        }),
        Err(DrpaiError::InvalidArg)
    );

    file.assign(&DrpaiData::new(0x1000, 0x40)).unwrap();
    assert_eq!(
        file.assign_param(&DrpaiAssignParam { info_size: 100, obj: PARAM_OBJ }),
        Err(DrpaiError::AccessDenied)
    );
    file.write(&[0u8; 0x40]).unwrap();

    upload(&file, PARAM_OBJ);
    assert_eq!(
        file.assign_param(&DrpaiAssignParam { info_size: 100, obj: PARAM_OBJ }),
        Err(DrpaiError::AccessDenied)
    );
}
