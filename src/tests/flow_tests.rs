//! tests/flow_tests.rs
//! Flujo completo de `CampaignService` con proveedor y registros falsos.

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use actix_rt::test;
    use chrono::Utc;

    use crate::errors::CampaignError;
    use crate::models::campaign_model::{CallType, CampaignStatus};
    use crate::models::recipient_model::{RecipientStatus, StatusSource};
    use crate::models::registry_model::EntitlementDecision;
    use crate::models::webhook_model::VoiceWebhookEvent;
    use crate::services::campaign_store::CampaignStore;
    use crate::tests::support::{
        count_call_logs, create_request, harness, harness_with, progress, remote, FakeDnc,
        FakeRegistry, Harness, BUSINESS,
    };

    const PHONES: [&str; 3] = ["05331234568", "05321234567", "05301112233"];

    async fn create_two(h: &Harness) -> String {
        h.service
            .create_campaign(BUSINESS, create_request(&PHONES[..2]))
            .await
            .unwrap()
            .campaign
            .id
    }

    fn event(campaign_id: &str, recipient_id: &str, status: &str, conv: Option<&str>) -> VoiceWebhookEvent {
        VoiceWebhookEvent {
            recipient_id: recipient_id.to_string(),
            campaign_id: campaign_id.to_string(),
            business_id: Some(BUSINESS.to_string()),
            status: status.to_string(),
            conversation_id: conv.map(str::to_string),
            duration_secs: Some(61),
            termination_reason: None,
        }
    }

    #[test]
    async fn crea_y_envia_omitiendo_no_llamar() {
        let h = harness_with(
            FakeDnc {
                blocked: vec!["+905321234567".to_string()],
                unavailable: false,
            },
            FakeRegistry::default(),
        )
        .await;

        let resp = h
            .service
            .create_campaign(BUSINESS, create_request(&PHONES))
            .await
            .unwrap();

        assert!(resp.success);
        assert_eq!(resp.skipped_do_not_call, 1);
        assert_eq!(resp.dropped_invalid_phones, 0);
        assert_eq!(resp.call_type, CallType::BillingReminder);

        let campaign = &resp.campaign;
        assert_eq!(campaign.total_recipients, 2);
        assert_eq!(campaign.status, CampaignStatus::InProgress);
        assert_eq!(campaign.provider_batch_id.as_deref(), Some("batch_1"));
        assert!(campaign.started_at.is_some());
        let ids: Vec<&str> = campaign.recipients.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["recipient_1", "recipient_2"]);
        assert_eq!(campaign.recipients[1].phone_e164, "+905301112233");

        let submitted = h.provider.submitted.lock().unwrap().clone();
        assert_eq!(submitted.len(), 1);
        let payload = &submitted[0];
        assert_eq!(payload.agent_id, "agent_xyz");
        assert_eq!(payload.agent_phone_number_id, "phnum_abc");
        assert!(payload.scheduled_time_unix.is_none());
        assert_eq!(payload.recipients.len(), 2);
        for (sent, local) in payload.recipients.iter().zip(&campaign.recipients) {
            assert_eq!(sent.metadata.business_id, BUSINESS);
            assert_eq!(sent.metadata.campaign_id, campaign.id);
            assert_eq!(sent.metadata.recipient_id, local.id);
            assert_eq!(sent.dynamic_variables.customer_name.as_deref(), Some("Ayşe"));
            assert_eq!(
                sent.dynamic_variables.campaign_name.as_deref(),
                Some("Cobranza marzo")
            );
        }

        let stored = h.service.get_campaign(BUSINESS, &campaign.id).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::InProgress);
    }

    #[test]
    async fn registro_no_llamar_caido_aborta_sin_persistir() {
        let h = harness_with(
            FakeDnc {
                blocked: vec![],
                unavailable: true,
            },
            FakeRegistry::default(),
        )
        .await;

        let err = h
            .service
            .create_campaign(BUSINESS, create_request(&PHONES))
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::ComplianceUnavailable(_)));
        assert_eq!(err.status_code().as_u16(), 503);

        assert!(h.provider.submitted.lock().unwrap().is_empty());
        let list = h.service.list_campaigns(BUSINESS, 1, 10).await.unwrap();
        assert_eq!(list.total, 0);
    }

    #[test]
    async fn rechazo_del_proveedor_deja_la_campana_fallida() {
        let h = harness().await;
        *h.provider.submit_error.lock().unwrap() = Some("invalid agent".to_string());

        let err = h
            .service
            .create_campaign(BUSINESS, create_request(&PHONES))
            .await
            .unwrap_err();
        let campaign = match err {
            CampaignError::Submission { campaign, detail } => {
                assert!(detail.contains("invalid agent"));
                campaign
            }
            other => panic!("error inesperado: {:?}", other),
        };
        assert_eq!(campaign.status, CampaignStatus::Failed);

        let stored = h.service.get_campaign(BUSINESS, &campaign.id).await.unwrap();
        assert_eq!(stored.status, CampaignStatus::Failed);
        assert!(stored
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("invalid agent"));
        assert!(stored.completed_at.is_some());
    }

    #[test]
    async fn envio_persiste_aunque_otro_escritor_gane_la_version() {
        let h = harness().await;
        *h.provider.concurrent_writer.lock().unwrap() = Some(CampaignStore::new(h.pool.clone()));
        let store = CampaignStore::new(h.pool.clone());

        let resp = h
            .service
            .create_campaign(BUSINESS, create_request(&PHONES[..2]))
            .await
            .unwrap();
        let stored = store.get_by_id(&resp.campaign.id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::InProgress);
        assert_eq!(stored.provider_batch_id.as_deref(), Some("batch_1"));
        assert!(stored.started_at.is_some());

        *h.provider.submit_error.lock().unwrap() = Some("invalid agent".to_string());
        let err = h
            .service
            .create_campaign(BUSINESS, create_request(&PHONES[..2]))
            .await
            .unwrap_err();
        let campaign_id = match err {
            CampaignError::Submission { campaign, .. } => campaign.id,
            other => panic!("error inesperado: {:?}", other),
        };
        let stored = store.get_by_id(&campaign_id).await.unwrap().unwrap();
        assert_eq!(stored.status, CampaignStatus::Failed);
        assert!(stored
            .error_message
            .as_deref()
            .unwrap_or_default()
            .contains("invalid agent"));
    }

    #[test]
    async fn validaciones_previas_al_envio() {
        let h = harness_with(
            FakeDnc::default(),
            FakeRegistry {
                provider_agent_id: Some("agent_xyz".to_string()),
                decision: EntitlementDecision::denied("PLAN_UPGRADE_REQUIRED", Some("pro")),
            },
        )
        .await;
        let err = h
            .service
            .create_campaign(BUSINESS, create_request(&PHONES))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "PLAN_UPGRADE_REQUIRED");
        assert_eq!(err.status_code().as_u16(), 403);

        let h = harness_with(
            FakeDnc::default(),
            FakeRegistry {
                provider_agent_id: None,
                decision: EntitlementDecision::granted(),
            },
        )
        .await;
        let err = h
            .service
            .create_campaign(BUSINESS, create_request(&PHONES))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "ASSISTANT_NOT_CONFIGURED");

        let h = harness().await;
        let mut req = create_request(&PHONES);
        req.name = "   ".to_string();
        let err = h.service.create_campaign(BUSINESS, req).await.unwrap_err();
        assert_eq!(err.reason_code(), "MISSING_NAME");

        let mut req = create_request(&PHONES);
        req.default_country = Some("ZZ".to_string());
        let err = h.service.create_campaign(BUSINESS, req).await.unwrap_err();
        assert_eq!(err.reason_code(), "UNSUPPORTED_COUNTRY");

        let mut req = create_request(&PHONES);
        req.phone_number_id = "pn_inexistente".to_string();
        let err = h.service.create_campaign(BUSINESS, req).await.unwrap_err();
        assert_eq!(err.reason_code(), "PHONE_NUMBER_NOT_FOUND");
        assert!(h.provider.submitted.lock().unwrap().is_empty());
    }

    #[test]
    async fn campana_programada_queda_pendiente() {
        let h = harness().await;
        let mut req = create_request(&PHONES);
        let at = Utc::now() + chrono::Duration::days(1);
        req.scheduled_at = Some(at);

        let resp = h.service.create_campaign(BUSINESS, req).await.unwrap();
        assert_eq!(resp.campaign.status, CampaignStatus::Pending);
        assert_eq!(resp.campaign.provider_batch_id.as_deref(), Some("batch_1"));

        let submitted = h.provider.submitted.lock().unwrap().clone();
        assert_eq!(submitted[0].scheduled_time_unix, Some(at.timestamp()));
    }

    #[test]
    async fn detalle_reconcilia_destinatarios_y_vincula_call_logs() {
        let h = harness().await;
        let id = create_two(&h).await;

        h.provider.add_conversation("conv_1", 95);
        let mut p = progress("completed", 2, 2, 1);
        p.recipients = vec![remote("recipient_1", "completed", Some("conv_1"))];
        h.provider.set_progress(p);

        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        // "completed" del proveedor con 1 de 2 terminadas: sigue en curso.
        assert_eq!(c.status, CampaignStatus::InProgress);
        assert_eq!(c.recipients[0].status, RecipientStatus::Completed);
        assert_eq!(c.recipients[0].status_source, StatusSource::Poll);
        assert!(c.recipients[0].call_log_id.is_some());
        assert_eq!(c.completed_calls, 1);
        assert_eq!(c.successful_calls, 1);
        assert!(c.last_synced_at.is_some());
        assert_eq!(count_call_logs(&h.pool).await, 1);

        // Segunda lectura: nada que backfillear, nada duplicado.
        let again = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert_eq!(again.recipients, c.recipients);
        assert_eq!(count_call_logs(&h.pool).await, 1);
        assert_eq!(h.provider.conversation_calls.load(Ordering::SeqCst), 1);

        // El proveedor "retrocede": los contadores no.
        h.provider.set_progress(progress("in_progress", 2, 2, 0));
        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert_eq!(c.completed_calls, 1);

        let mut p = progress("in_progress", 2, 2, 2);
        p.recipients = vec![remote("recipient_2", "no_answer", None)];
        h.provider.set_progress(p);
        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert_eq!(c.status, CampaignStatus::Completed);
        assert!(c.completed_at.is_some());
        assert_eq!(c.completed_calls, 2);
        assert_eq!(c.failed_calls, 1);
    }

    #[test]
    async fn conversacion_no_disponible_se_reintenta_luego() {
        let h = harness().await;
        let id = create_two(&h).await;

        let mut p = progress("in_progress", 2, 2, 1);
        p.recipients = vec![remote("recipient_1", "completed", Some("conv_pendiente"))];
        h.provider.set_progress(p);

        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert_eq!(c.recipients[0].status, RecipientStatus::Completed);
        assert!(c.recipients[0].call_log_id.is_none());
        assert_eq!(count_call_logs(&h.pool).await, 0);

        h.provider.add_conversation("conv_pendiente", 30);
        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert!(c.recipients[0].call_log_id.is_some());
        assert_eq!(h.provider.conversation_calls.load(Ordering::SeqCst), 2);
        assert_eq!(count_call_logs(&h.pool).await, 1);
    }

    #[test]
    async fn listado_tolera_fallos_del_proveedor() {
        let h = harness().await;
        create_two(&h).await;
        create_two(&h).await;

        // Sin progreso configurado el proveedor falla: se devuelve lo local.
        let list = h.service.list_campaigns(BUSINESS, 1, 10).await.unwrap();
        assert_eq!(list.total, 2);
        assert!(list
            .items
            .iter()
            .all(|c| c.status == CampaignStatus::InProgress && c.completed_calls == 0));

        h.provider.set_progress(progress("in_progress", 2, 2, 1));
        let list = h.service.list_campaigns(BUSINESS, 1, 10).await.unwrap();
        assert!(list.items.iter().all(|c| c.completed_calls == 1));

        // Página fuera de rango y tamaño acotado
        let list = h.service.list_campaigns(BUSINESS, 0, 1000).await.unwrap();
        assert_eq!(list.page, 1);
        assert_eq!(list.page_size, 100);
    }

    #[test]
    async fn reconciliacion_lenta_se_corta_por_timeout() {
        let h = harness().await;
        let id = create_two(&h).await;
        h.provider.set_progress(progress("in_progress", 2, 2, 2));
        *h.provider.get_batch_delay.lock().unwrap() = Some(Duration::from_secs(3));

        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert_eq!(c.status, CampaignStatus::InProgress);
        assert!(c.last_synced_at.is_none());
    }

    #[test]
    async fn cancelar_con_fallo_remoto_igual_cancela() {
        let h = harness().await;
        let id = create_two(&h).await;
        h.provider.cancel_fails.store(true, Ordering::SeqCst);

        let resp = h.service.cancel_campaign(BUSINESS, &id).await.unwrap();
        assert!(resp.success);
        assert!(!resp.remote_cancelled);
        assert!(resp.warning.is_some());
        assert_eq!(resp.campaign.status, CampaignStatus::Cancelled);
        assert!(resp.campaign.completed_at.is_some());

        let err = h.service.cancel_campaign(BUSINESS, &id).await.unwrap_err();
        assert!(matches!(err, CampaignError::InvalidState(CampaignStatus::Cancelled)));
        assert_eq!(err.status_code().as_u16(), 409);

        // Terminal: la lectura ya no consulta al proveedor.
        h.provider.set_progress(progress("in_progress", 2, 2, 2));
        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert_eq!(c.status, CampaignStatus::Cancelled);
    }

    #[test]
    async fn cancelar_ok_y_tenant_ajeno() {
        let h = harness().await;
        let id = create_two(&h).await;

        let err = h.service.cancel_campaign("biz_2", &id).await.unwrap_err();
        assert!(matches!(err, CampaignError::NotFound(_)));

        let resp = h.service.cancel_campaign(BUSINESS, &id).await.unwrap();
        assert!(resp.remote_cancelled);
        assert!(resp.warning.is_none());
        assert_eq!(h.provider.cancel_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    async fn webhook_actualiza_y_el_poll_no_lo_pisa() {
        let h = harness().await;
        let id = create_two(&h).await;
        h.provider.add_conversation("conv_9", 61);

        let ack = h
            .service
            .handle_webhook(event(&id, "recipient_1", "completed", Some("conv_9")))
            .await
            .unwrap();
        assert!(ack.applied);
        assert_eq!(ack.recipient_status, "completed");
        assert_eq!(count_call_logs(&h.pool).await, 1);

        // Repetido: no cambia nada.
        let ack = h
            .service
            .handle_webhook(event(&id, "recipient_1", "completed", Some("conv_9")))
            .await
            .unwrap();
        assert!(!ack.applied);

        let mut p = progress("in_progress", 2, 1, 0);
        p.recipients = vec![remote("recipient_1", "in_progress", None)];
        h.provider.set_progress(p);

        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert_eq!(c.recipients[0].status, RecipientStatus::Completed);
        assert_eq!(c.recipients[0].status_source, StatusSource::Webhook);
        assert_eq!(c.recipients[0].duration_secs, Some(61));
        assert!(c.recipients[0].call_log_id.is_some());
        assert_eq!(c.completed_calls, 1);
        assert_eq!(count_call_logs(&h.pool).await, 1);
    }

    #[test]
    async fn webhook_fallido_tras_completado_no_recuenta() {
        let h = harness().await;
        let id = create_two(&h).await;

        let ack = h
            .service
            .handle_webhook(event(&id, "recipient_1", "completed", None))
            .await
            .unwrap();
        assert!(ack.applied);

        let ack = h
            .service
            .handle_webhook(event(&id, "recipient_1", "failed", None))
            .await
            .unwrap();
        assert!(!ack.applied);
        assert_eq!(ack.recipient_status, "completed");

        let c = h.service.get_campaign(BUSINESS, &id).await.unwrap();
        assert_eq!(c.recipients[0].status, RecipientStatus::Completed);
        assert_eq!(c.completed_calls, 1);
        assert_eq!(c.successful_calls, 1);
        assert_eq!(c.failed_calls, 0);
    }

    #[test]
    async fn listado_con_pagina_enorme_no_desborda() {
        let h = harness().await;
        create_two(&h).await;

        let list = h.service.list_campaigns(BUSINESS, u64::MAX, 10).await.unwrap();
        assert_eq!(list.total, 1);
        assert!(list.items.is_empty());
    }

    #[test]
    async fn webhook_invalido() {
        let h = harness().await;
        let id = create_two(&h).await;

        let err = h
            .service
            .handle_webhook(event(&id, "recipient_1", "teleported", None))
            .await
            .unwrap_err();
        assert_eq!(err.reason_code(), "UNKNOWN_CALL_STATUS");

        let err = h
            .service
            .handle_webhook(event(&id, "recipient_99", "completed", None))
            .await
            .unwrap_err();
        assert!(matches!(err, CampaignError::NotFound(_)));

        let mut ajeno = event(&id, "recipient_1", "completed", None);
        ajeno.business_id = Some("biz_2".to_string());
        let err = h.service.handle_webhook(ajeno).await.unwrap_err();
        assert!(matches!(err, CampaignError::NotFound(_)));
    }
}
